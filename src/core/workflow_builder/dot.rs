//! Graphviz export of template call graphs and DAG bodies.

use crate::core::error::{BuildError, BuildResult};
use crate::core::workflow_builder::task::TemplateTarget;
use crate::core::workflow_builder::template::TemplateBody;
use crate::core::workflow_builder::workflow::Workflow;
use petgraph::dot::Dot;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A template of this workflow, or one referenced from another workflow.
pub struct TemplateNode {
    pub name: String,
    pub kind: &'static str,
}

impl fmt::Display for TemplateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}

pub struct CallGraph {
    graph: DiGraph<TemplateNode, String>,
    nodes: HashMap<String, NodeIndex>,
}

impl CallGraph {
    /// Names of templates reachable from `root`, `root` included.
    pub fn reachable_from(&self, root: &str) -> HashSet<String> {
        let mut reachable = HashSet::new();
        let Some(&start) = self.nodes.get(root) else {
            return reachable;
        };
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(node) = bfs.next(&self.graph) {
            reachable.insert(self.graph[node].name.clone());
        }
        reachable
    }

    pub fn to_dot(&self) -> String {
        format!("{}", Dot::new(&self.graph))
    }
}

fn external_name(workflow: &str, template: &str) -> String {
    format!("{}/{}", workflow, template)
}

/// Edges run from a steps/dag template to every template its steps or tasks invoke.
pub fn call_graph(workflow: &Workflow) -> CallGraph {
    let mut graph = DiGraph::new();
    let mut nodes: HashMap<String, NodeIndex> = HashMap::new();

    for template in workflow.templates() {
        let index = graph.add_node(TemplateNode {
            name: template.name().to_string(),
            kind: template.body().kind(),
        });
        nodes.insert(template.name().to_string(), index);
    }

    for template in workflow.templates() {
        let from = nodes[template.name()];
        for task in template.body().invocations() {
            let to = match &task.target {
                TemplateTarget::Internal(signature) => match nodes.get(&signature.name) {
                    Some(&to) => to,
                    None => continue,
                },
                TemplateTarget::External {
                    workflow: other,
                    signature,
                } => {
                    let name = external_name(other, &signature.name);
                    *nodes.entry(name.clone()).or_insert_with(|| {
                        graph.add_node(TemplateNode {
                            name,
                            kind: "templateRef",
                        })
                    })
                }
            };
            graph.add_edge(from, to, task.name.clone());
        }
    }

    CallGraph { graph, nodes }
}

pub fn workflow_to_dot(workflow: &Workflow) -> String {
    call_graph(workflow).to_dot()
}

/// Task dependency graph of one DAG template; edges point from a dependency to its dependent.
pub fn dag_to_dot(workflow: &Workflow, template: &str) -> BuildResult<String> {
    let found = workflow.template(template).ok_or_else(|| {
        BuildError::declaration(
            "WFB-DECL-002",
            format!("workflow '{}' has no template '{}'", workflow.name(), template),
        )
    })?;
    let TemplateBody::Dag(tasks) = found.body() else {
        return Err(BuildError::render(
            "WFB-REND-003",
            format!(
                "template '{}' has a {} body; only dag templates can be exported",
                template,
                found.body().kind()
            ),
        ));
    };

    let mut graph: DiGraph<String, &str> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    for task in tasks {
        let label = format!("{} ({})", task.name, task.target.template_name());
        nodes.insert(task.name.as_str(), graph.add_node(label));
    }
    for task in tasks {
        let to = nodes[task.name.as_str()];
        for dep in &task.dependencies {
            if let Some(&from) = nodes.get(dep.as_str()) {
                graph.add_edge(from, to, "");
            }
        }
    }
    Ok(format!("{}", Dot::new(&graph)))
}
