use std::rc::Rc;

use docweave::document::{Document, NodeId};
use docweave::parser::{Parser, TemplateError};
use expander::{
    DiagnosticError, Engine, ExpandError, FormatContext, Formatter, ModelObject, ProcessingMode,
    Report, Value,
};

fn obj(pairs: &[(&str, Value)]) -> Value {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

fn process(
    source: &str,
    model: Value,
    mode: ProcessingMode,
) -> Result<(String, Report), DiagnosticError> {
    let mut doc = Parser::new(source.to_string(), 0).read();
    let mut engine = Engine::new(mode);
    engine.bind("doc", model);
    let report = engine.process(&mut doc)?;
    Ok((doc.to_string(), report))
}

fn run(source: &str, model: Value) -> String {
    match process(source, model, ProcessingMode::Throw) {
        Ok((out, _)) => out,
        Err(e) => panic!("expansion failed: {}", e),
    }
}

fn run_trimmed(source: &str, model: Value) -> String {
    run(source, model).trim().to_string()
}

fn run_err(source: &str, model: Value, mode: ProcessingMode) -> DiagnosticError {
    match process(source, model, mode) {
        Ok((out, _)) => panic!("expected an error, got {:?}", out),
        Err(e) => e,
    }
}

fn fruits() -> Value {
    obj(&[("items", Value::from(vec!["apple", "pear", "fig"]))])
}

// ---------------------------------------------------------------------------
// Variables
// ---------------------------------------------------------------------------

#[test]
fn variables_outside_blocks() {
    let model = obj(&[("name", "Ada".into()), ("age", Value::Number(36.0))]);
    assert_eq!(run_trimmed("Hello {{name}}, {{doc.age}}.", model), "Hello Ada, 36.");
}

#[test]
fn substitution_keeps_run_formatting() {
    let model = obj(&[("name", "Ada".into()), ("age", Value::Number(36.0))]);
    assert_eq!(
        run_trimmed("**{{name}}** is *{{age}}* years old", model),
        "**Ada** is *36* years old"
    );
}

#[test]
fn formatters_apply_to_variables() {
    let model = obj(&[
        ("price", Value::Number(12.5)),
        ("name", "ada".into()),
        ("note", Value::Null),
    ]);
    assert_eq!(
        run_trimmed("{{name:upper}} pays {{price:fixed(2)}} ({{note:default('none')}})", model),
        "ADA pays 12.50 (none)"
    );
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

#[test]
fn loop_keeps_item_order_and_metadata() {
    assert_eq!(
        run_trimmed("{{#items}}{{_Idx}}/{{_Length}}={{.}} {{/items}}", fruits()),
        "1/3=apple 2/3=pear 3/3=fig"
    );
}

#[test]
fn separator_renders_between_items_only() {
    assert_eq!(
        run_trimmed("Fruit: {{#items}}{{.}}{{:s:}}, {{/}}.", fruits()),
        "Fruit: apple, pear, fig."
    );
}

#[test]
fn paragraph_loop_repeats_blocks() {
    assert_eq!(
        run("{{#items}}\n\n## {{.}}\n\n{{/items}}\n", fruits()),
        "## apple\n\n## pear\n\n## fig\n"
    );
}

#[test]
fn loop_over_null_renders_nothing() {
    let model = obj(&[("items", Value::Null)]);
    assert_eq!(run_trimmed("a{{#items}}x{{/}}b", model), "ab");
}

#[test]
fn table_row_loop() {
    let lines = Value::from(vec![
        obj(&[("sku", "A1".into()), ("qty", Value::Number(2.0))]),
        obj(&[("sku", "B2".into()), ("qty", Value::Number(5.0))]),
    ]);
    let model = obj(&[("lines", lines)]);
    let source = "| SKU | Qty |\n|---|---|\n| {{#lines}}{{.sku}} | {{lines.qty}}{{/lines}} |\n";
    assert_eq!(
        run(source, model),
        "| SKU | Qty |\n|---|---|\n| A1 | 2 |\n| B2 | 5 |\n"
    );
}

#[test]
fn condition_across_table_cells() {
    let source = "| A | B |\n|---|---|\n| {?{show}}x | y{{/}} |\n";
    let show = |b: bool| obj(&[("show", Value::Bool(b))]);
    assert_eq!(run(source, show(true)), "| A | B |\n|---|---|\n| x | y |\n");
    assert_eq!(run(source, show(false)), "| A | B |\n|---|---|\n");
}

#[test]
fn condition_with_else_row() {
    let source = "| A | B |\n|---|---|\n| {?{paid}}Paid | yes |\n| {{else}}Due | no{{/}} |\n";
    let paid = |b: bool| obj(&[("paid", Value::Bool(b))]);
    assert_eq!(run(source, paid(true)), "| A | B |\n|---|---|\n| Paid | yes |\n");
    assert_eq!(run(source, paid(false)), "| A | B |\n|---|---|\n| Due | no |\n");
}

#[test]
fn separator_loop_across_table_cells() {
    let source = "| A | B |\n|---|---|\n| {{#items}}{{.}} | {{:s:}}-{{/}} |\n";
    assert_eq!(
        run(source, fruits()),
        "| A | B |\n|---|---|\n| apple | - |\n| pear | - |\n| fig |  |\n"
    );
}

#[test]
fn range_counts_up_from_zero() {
    let model = obj(&[("n", Value::Number(-2.0)), ("three", "3".into())]);
    assert_eq!(run_trimmed("{{@i:3}}({{i}}){{/}}", model.clone()), "(0)(1)(2)");
    assert_eq!(run_trimmed("{{@three}}[{{Index}}]{{/}}", model.clone()), "[0][1][2]");
    assert_eq!(run_trimmed("a{{@i:n}}x{{/}}b", model), "ab");
}

#[test]
fn fractional_range_count_is_a_type_mismatch() {
    for n in [Value::Number(2.7), Value::from("2.5")] {
        let err = run_err("{{@i:n}}[{{i}}]{{/}}", obj(&[("n", n)]), ProcessingMode::Throw);
        assert!(matches!(err.error, ExpandError::TypeMismatch { .. }), "{:?}", err);
    }
    let whole = obj(&[("n", Value::Number(2.0))]);
    assert_eq!(run_trimmed("{{@i:n}}[{{i}}]{{/}}", whole), "[0][1]");
}

#[test]
fn range_over_collection_length() {
    assert_eq!(run_trimmed("{{@k:items}}{{k}}{{/}}", fruits()), "012");
}

#[test]
fn leading_dots_reach_enclosing_items() {
    let shop = obj(&[
        ("city", "Paris".into()),
        ("staff", Value::from(vec!["Ann", "Bo"])),
    ]);
    let region = obj(&[("name", "EU".into()), ("shops", Value::from(vec![shop]))]);
    let model = obj(&[("regions", Value::from(vec![region]))]);
    assert_eq!(
        run_trimmed(
            "{{#regions}}{{#.shops}}{{#.staff}}{{...name}}/{{..city}}/{{.}}{{:s:}},{{/}}{{/}}{{/}}",
            model
        ),
        "EU/Paris/Ann,EU/Paris/Bo"
    );
}

// ---------------------------------------------------------------------------
// Conditions and switches
// ---------------------------------------------------------------------------

#[test]
fn condition_selects_branch() {
    let template = "Order {?{total > 100 and status == 'paid'}}ships free{{else}}pays postage{{/}}.";
    let paid = obj(&[("total", Value::Number(150.0)), ("status", "paid".into())]);
    let due = obj(&[("total", Value::Number(150.0)), ("status", "due".into())]);
    assert_eq!(run_trimmed(template, paid), "Order ships free.");
    assert_eq!(run_trimmed(template, due), "Order pays postage.");
}

#[test]
fn condition_without_else() {
    let model = obj(&[("vip", Value::Bool(false))]);
    assert_eq!(run_trimmed("Hi{?{vip}} boss{{/}}!", model), "Hi!");
}

#[test]
fn condition_inside_loop_sees_each_item() {
    let model = obj(&[("nums", Value::from(vec![1i64, 2, 3, 4]))]);
    assert_eq!(
        run_trimmed("{{#nums}}{?{. % 2 == 0}}{{.}}{{/}}{{/}}", model),
        "24"
    );
}

#[test]
fn switch_picks_first_matching_case() {
    let template =
        "{{#s:status}}{{#c:'paid'}}Paid{{/}}{{#c:'due'}}Due{{/}}{{#d}}Unknown{{/}}{{/}}";
    let status = |s: &str| obj(&[("status", s.into())]);
    assert_eq!(run_trimmed(template, status("due")), "Due");
    assert_eq!(run_trimmed(template, status("paid")), "Paid");
    assert_eq!(run_trimmed(template, status("void")), "Unknown");
}

#[test]
fn switch_inside_loop_matches_per_item() {
    let model = obj(&[("codes", Value::from(vec![1i64, 2, 1]))]);
    let template = "{{#codes}}{{#s:.}}{{#c:1}}one{{/}}{{#d}}other{{/}}{{/}}{{:s:}} {{/}}";
    assert_eq!(run_trimmed(template, model), "one other one");
}

#[test]
fn switch_without_match_or_default_renders_nothing() {
    let model = obj(&[("status", "void".into())]);
    assert_eq!(
        run_trimmed("a{{#s:status}}{{#c:'paid'}}Paid{{/}}{{#c:'due'}}Due{{/}}{{/}}b", model),
        "ab"
    );
}

#[test]
fn first_of_two_matching_cases_wins() {
    let model = obj(&[("n", Value::Number(2.0))]);
    assert_eq!(
        run_trimmed("{{#s:n}}{{#c:2}}first{{/}}{{#c:1 + 1}}second{{/}}{{/}}", model),
        "first"
    );
}

// ---------------------------------------------------------------------------
// Dynamic tables, keywords, ignore
// ---------------------------------------------------------------------------

#[test]
fn dynamic_table_pads_short_rows() {
    let grid = Value::Table {
        headers: vec!["A".into(), "B".into()],
        rows: vec![
            vec![Value::Number(1.0), Value::Number(2.0)],
            vec![Value::Number(3.0)],
        ],
    };
    let model = obj(&[("grid", grid)]);
    let source = "{{#grid:dyntable}}\n\n| {{Header}} |\n|---|\n| {{Cell}} |\n\n{{/grid}}\n";
    assert_eq!(
        run(source, model),
        "| A | B |\n|---|---|\n| 1 | 2 |\n| 3 |  |\n"
    );
}

#[test]
fn dynamic_table_from_map_and_empty_headers() {
    let source = "{{#grid:dyntable}}\n\n| {{Header}} |\n|---|\n| {{Cell}} |\n\n{{/grid}}\n\nEnd\n";
    let grid = obj(&[
        ("headers", Value::from(vec!["X"])),
        ("rows", Value::from(vec![Value::from(vec!["x1"])])),
    ]);
    assert_eq!(
        run(source, obj(&[("grid", grid)])),
        "| X |\n|---|\n| x1 |\n\nEnd\n"
    );

    let empty = obj(&[
        ("headers", Value::List(Vec::new())),
        ("rows", Value::List(Vec::new())),
    ]);
    assert_eq!(run(source, obj(&[("grid", empty)])), "End\n");
}

#[test]
fn inline_keywords_insert_breaks() {
    assert_eq!(run("a{{:break}}b\n", obj(&[])), "a\\\nb\n");
    assert_eq!(
        run("a{{:pageBreak}}b\n", obj(&[])),
        "a<!-- pagebreak -->b\n"
    );
}

#[test]
fn ignore_keeps_markup_verbatim() {
    let model = obj(&[("name", "Ada".into())]);
    assert_eq!(
        run_trimmed("{{name}}: {{#ignore}}{{name}} {{#x}}{{/ignore}}", model),
        "Ada: {{name}} {{#x}}"
    );
}

// ---------------------------------------------------------------------------
// Processing modes
// ---------------------------------------------------------------------------

#[test]
fn throw_mode_stops_on_missing_model() {
    let err = run_err("Hi {{missing}}!", obj(&[]), ProcessingMode::Throw);
    assert!(matches!(err.error, ExpandError::ModelNotFound { .. }));
    assert!(!err.is_warning);
    assert!(err.span.is_some());
}

#[test]
fn skip_mode_removes_failing_fields() {
    let (out, report) =
        process("Hi {{missing}}!", obj(&[]), ProcessingMode::SkipAndRemove).unwrap();
    assert_eq!(out, "Hi !\n");
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.diagnostics[0].is_warning);
}

#[test]
fn skip_mode_drops_failing_blocks() {
    let model = obj(&[("name", "Ada".into())]);
    let (out, report) =
        process("a{{#name}}x{{/}}b", model, ProcessingMode::SkipAndRemove).unwrap();
    assert_eq!(out, "ab\n");
    assert!(matches!(
        report.diagnostics[0].error,
        ExpandError::TypeMismatch { .. }
    ));
}

#[test]
fn highlight_mode_marks_errors_in_place() {
    let (out, report) = process("Hi {{missing}}!", obj(&[]), ProcessingMode::Highlight).unwrap();
    assert_eq!(
        out,
        "Hi <mark>[error: model not found for 'missing']</mark>!\n"
    );
    assert_eq!(report.diagnostics.len(), 1);
}

#[test]
fn highlight_mode_marks_failing_blocks() {
    let model = obj(&[("name", "Ada".into())]);
    let (out, _) = process("{{#name}}x{{/}}", model, ProcessingMode::Highlight).unwrap();
    assert_eq!(
        out,
        "<mark>[error: 'name': expected a collection, got String]</mark>\n"
    );
}

#[test]
fn structural_errors_are_fatal_in_every_mode() {
    for mode in [
        ProcessingMode::Throw,
        ProcessingMode::SkipAndRemove,
        ProcessingMode::Highlight,
    ] {
        let err = run_err("{{#items}} never closed", fruits(), mode);
        assert!(
            matches!(err.error, ExpandError::Template(TemplateError::Unclosed(_))),
            "{:?}: {:?}",
            mode,
            err
        );
    }
}

#[test]
fn dynamic_table_without_cell_template_is_structural() {
    let grid = Value::Table {
        headers: vec!["A".into()],
        rows: Vec::new(),
    };
    let source = "{{#grid:dyntable}}\n\n| {{Header}} |\n|---|\n| plain |\n\n{{/grid}}\n";
    let err = run_err(source, obj(&[("grid", grid)]), ProcessingMode::SkipAndRemove);
    assert!(err.error.is_structural());
}

#[test]
fn errors_inside_loops_are_handled_per_item() {
    let people = Value::from(vec![
        obj(&[("name", "Ann".into())]),
        obj(&[("nick", "Bo".into())]),
    ]);
    let model = obj(&[("people", people)]);
    let (out, report) = process(
        "{{#people}}[{{.name}}]{{/}}",
        model,
        ProcessingMode::SkipAndRemove,
    )
    .unwrap();
    assert_eq!(out, "[Ann][]\n");
    assert_eq!(report.diagnostics.len(), 1);
}

// ---------------------------------------------------------------------------
// Extension points
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Person {
    first: String,
    last: String,
}

impl ModelObject for Person {
    fn type_name(&self) -> &str {
        "Person"
    }

    fn property(&self, name: &str) -> Option<Value> {
        match name {
            "first" => Some(self.first.as_str().into()),
            "last" => Some(self.last.as_str().into()),
            "full" => Some(format!("{} {}", self.first, self.last).into()),
            _ => None,
        }
    }
}

#[test]
fn model_objects_answer_property_lookups() {
    let ada = Person {
        first: "Ada".into(),
        last: "Lovelace".into(),
    };
    let model = obj(&[("author", Value::Object(Rc::new(ada)))]);
    assert_eq!(
        run_trimmed("{{author.full}} ({{author.last:upper}})", model.clone()),
        "Ada Lovelace (LOVELACE)"
    );
    let err = run_err("{{author.middle}}", model, ProcessingMode::Throw);
    assert!(matches!(err.error, ExpandError::PropertyNotFound { .. }));
}

struct Initials;

impl Formatter for Initials {
    fn can_handle(&self, type_name: &str, name: &str) -> bool {
        type_name == "Person" && name.eq_ignore_ascii_case("initials")
    }

    fn apply(
        &self,
        ctx: &FormatContext<'_>,
        doc: &mut Document,
        leaf: NodeId,
    ) -> Result<(), ExpandError> {
        let initial = |field: &str| {
            ctx.value
                .member(field)
                .map(|v| v.to_string().chars().take(1).collect::<String>())
                .unwrap_or_default()
        };
        doc.set_text(leaf, format!("{}.{}.", initial("first"), initial("last")));
        Ok(())
    }
}

#[test]
fn user_formatters_are_consulted() {
    let ada = Person {
        first: "Ada".into(),
        last: "Lovelace".into(),
    };
    let mut doc = Parser::new("By {{author:initials}}".to_string(), 0).read();
    let mut engine = Engine::new(ProcessingMode::Throw);
    engine
        .bind("author", Value::Object(Rc::new(ada)))
        .register_formatter(Box::new(Initials));
    engine.process(&mut doc).unwrap();
    assert_eq!(doc.to_string(), "By A.L.\n");
}

#[test]
fn unknown_formatter_is_a_data_error() {
    let model = obj(&[("name", "Ada".into())]);
    let err = run_err("{{name:sparkle}}", model.clone(), ProcessingMode::Throw);
    assert!(matches!(
        err.error,
        ExpandError::FormatterNotApplicable { .. }
    ));
    let (out, _) = process("{{name:sparkle}}!", model, ProcessingMode::SkipAndRemove).unwrap();
    assert_eq!(out, "!\n");
}

#[test]
fn first_bound_model_is_the_implicit_root() {
    let mut doc = Parser::new("{{title}} by {{company.name}}".to_string(), 0).read();
    let mut engine = Engine::new(ProcessingMode::Throw);
    engine
        .bind("report", obj(&[("title", "Q3".into())]))
        .bind("company", obj(&[("name", "Acme".into())]));
    let report = engine.process(&mut doc).unwrap();
    assert_eq!(doc.to_string(), "Q3 by Acme\n");
    assert!(report.diagnostics.is_empty());
}
