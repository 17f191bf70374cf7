use argoflow::core::workflow_builder::expression::evaluate::{evaluate, EvaluationContext};
use argoflow::core::workflow_builder::expression::render::{condition, template_string};
use argoflow::core::workflow_builder::{
    Complexity, Expr, ParamSource, TemplateScope, ValueType, WorkflowBuilder, WorkflowVariable,
};
use serde_json::json;

fn input(name: &str, ty: ValueType) -> Expr {
    Expr::parameter(ParamSource::Input, name, ty)
}

fn letters() -> Expr {
    input("letters", ValueType::array(ValueType::String))
}

#[test]
fn serialize_then_deserialize_evaluates_to_the_original_record() {
    let ty = ValueType::record([
        ("name", ValueType::String),
        ("replicas", ValueType::Number),
        ("tags", ValueType::array(ValueType::String)),
    ]);
    let cfg = input("cfg", ty.clone());
    let round_trip = Expr::deserialize(Expr::serialize(cfg.clone())).unwrap();
    assert_eq!(round_trip.value_type(), &ty);

    let value = json!({"name": "api", "replicas": 3, "tags": ["a", "b"]});
    // The engine holds parameters as JSON text.
    let ctx = EvaluationContext::new().with_input("cfg", value.to_string());
    assert_eq!(evaluate(&round_trip, &ctx).unwrap(), value);
    assert_eq!(evaluate(&cfg, &ctx).unwrap(), value);
    assert_eq!(
        template_string(&round_trip),
        "{{=fromJSON(inputs.parameters.cfg)}}"
    );
}

#[test]
fn comparisons_require_matching_types_in_a_template() {
    let result = WorkflowBuilder::create("wf")
        .unwrap()
        .add_template("t", |t| {
            let t = t
                .add_required_input("name", ValueType::String)?
                .add_required_input("count", ValueType::Number)?;
            let same = Expr::equals(t.input("name")?, Expr::literal("x"));
            assert!(same.is_ok());
            Expr::equals(t.input("name")?, t.input("count")?)?;
            t.add_container(|c| c.image("alpine"))
        });
    let err = result.unwrap_err();
    assert_eq!(err.code, "WFB-TYPE-001");
    assert!(err.message.contains("string and number"), "{}", err.message);
}

#[test]
fn ternary_complexity_is_the_widest_child() {
    let cond = Expr::greater_than(input("n", ValueType::Number), Expr::literal(1)).unwrap();
    let simple = Expr::ternary(cond.clone(), Expr::literal("many"), Expr::literal("one")).unwrap();
    assert_eq!(simple.complexity(), Complexity::Simple);

    let picked = Expr::index_at(letters(), 0).unwrap();
    let selected = Expr::select_path(
        input("cfg", ValueType::record([("label", ValueType::String)])),
        "label",
    )
    .unwrap();
    assert_eq!(selected.complexity(), Complexity::Template);
    let widened = Expr::ternary(cond, picked, selected).unwrap();
    assert_eq!(widened.complexity(), Complexity::Template);
}

#[test]
fn array_index_and_length_evaluate_like_the_engine() {
    let ctx = EvaluationContext::new().with_input("letters", r#"["a","b","c"]"#);
    let second = Expr::index_at(letters(), 1).unwrap();
    assert_eq!(second.value_type(), &ValueType::String);
    assert_eq!(evaluate(&second, &ctx).unwrap(), json!("b"));
    assert_eq!(
        template_string(&second),
        "{{=fromJSON(inputs.parameters.letters)[1]}}"
    );

    let length = Expr::length(letters()).unwrap();
    assert_eq!(evaluate(&length, &ctx).unwrap(), json!(3));
    assert_eq!(
        template_string(&length),
        "{{=len(fromJSON(inputs.parameters.letters))}}"
    );

    let empty = EvaluationContext::new().with_input("letters", "[]");
    assert_eq!(evaluate(&length, &empty).unwrap(), json!(0));
    assert_eq!(evaluate(&second, &empty).unwrap_err().code, "WFB-EVAL-001");
}

#[test]
fn conditions_prefer_govaluate_text() {
    let mode = input("mode", ValueType::String);
    let retries = input("retries", ValueType::Number);
    let cond = Expr::and(
        Expr::equals(mode, Expr::literal("fast")).unwrap(),
        Expr::less_than(retries, Expr::literal(3)).unwrap(),
    )
    .unwrap();
    assert_eq!(
        condition(&cond),
        "('{{inputs.parameters.mode}}' == 'fast') && ({{inputs.parameters.retries}} < 3)"
    );

    let ctx = EvaluationContext::new()
        .with_input("mode", "fast")
        .with_input("retries", "2");
    assert_eq!(evaluate(&cond, &ctx).unwrap(), json!(true));

    let nonempty = Expr::greater_than(Expr::length(letters()).unwrap(), Expr::literal(0)).unwrap();
    assert_eq!(
        condition(&nonempty),
        "{{=(len(fromJSON(inputs.parameters.letters)) > 0)}}"
    );
}

#[test]
fn quotes_are_escaped_on_both_sides_of_a_condition() {
    let greeting = Expr::concat(vec![Expr::literal("it's "), input("who", ValueType::String)]).unwrap();
    let cond = Expr::equals(greeting, Expr::literal("it's me")).unwrap();
    assert_eq!(
        condition(&cond),
        r"'it\'s {{inputs.parameters.who}}' == 'it\'s me'"
    );

    let joined = Expr::concat_with(
        "'",
        vec![input("left", ValueType::String), Expr::literal("o'clock")],
    )
    .unwrap();
    let cond = Expr::not_equals(joined, Expr::literal("")).unwrap();
    assert_eq!(
        condition(&cond),
        r"'{{inputs.parameters.left}}\'o\'clock' != ''"
    );

    let ctx = EvaluationContext::new().with_input("who", "me");
    let cond = Expr::equals(
        Expr::concat(vec![Expr::literal("it's "), input("who", ValueType::String)]).unwrap(),
        Expr::literal("it's me"),
    )
    .unwrap();
    assert_eq!(evaluate(&cond, &ctx).unwrap(), json!(true));
}

#[test]
fn workflow_variables_and_conversions() {
    let name = Expr::workflow_variable(WorkflowVariable::Name);
    assert_eq!(template_string(&name), "{{workflow.name}}");

    let label = Expr::concat_with("-", vec![name, Expr::literal("run")]).unwrap();
    assert_eq!(template_string(&label), "{{workflow.name}}-run");

    let ctx = EvaluationContext::new()
        .with_variable("workflow.name", "nightly")
        .with_input("port", "8080");
    assert_eq!(evaluate(&label, &ctx).unwrap(), json!("nightly-run"));

    let port = Expr::as_number(input("port", ValueType::String)).unwrap();
    let next = Expr::plus(port, Expr::literal(1)).unwrap();
    assert_eq!(evaluate(&next, &ctx).unwrap(), json!(8081));

    let encoded = Expr::base64_encode(Expr::literal("hi")).unwrap();
    assert_eq!(evaluate(&encoded, &ctx).unwrap(), json!("aGk="));
    let decoded = Expr::base64_decode(encoded).unwrap();
    assert_eq!(evaluate(&decoded, &ctx).unwrap(), json!("hi"));
}

#[test]
fn typed_literals_are_checked() {
    let ty = ValueType::array(ValueType::Number);
    assert!(Expr::typed_literal(json!([1, 2]), ty.clone()).is_ok());
    let err = Expr::typed_literal(json!([1, "two"]), ty).unwrap_err();
    assert_eq!(err.code, "WFB-TYPE-003");
}
