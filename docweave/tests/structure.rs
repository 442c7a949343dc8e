use docweave::block::{BlockKind, BranchKind};
use docweave::context::IdGenerator;
use docweave::parser::{Parser, TemplateError};
use docweave::Template;

fn parse(source: &str) -> Template {
    let mut ids = IdGenerator::new();
    match Parser::new(source.to_string(), 0).parse(&mut ids) {
        Ok(t) => t,
        Err(errors) => panic!("parse failed: {:?}", errors),
    }
}

fn parse_err(source: &str) -> TemplateError {
    let mut ids = IdGenerator::new();
    match Parser::new(source.to_string(), 0).parse(&mut ids) {
        Ok(_) => panic!("expected parse error"),
        Err(errors) => errors[0].error.clone(),
    }
}

fn outline(t: &Template) -> Vec<(usize, &'static str)> {
    let mut out = Vec::new();
    t.blocks.walk(|b, depth| out.push((depth, b.kind.name())));
    out
}

// ---------------------------------------------------------------------------
// Block trees
// ---------------------------------------------------------------------------

#[test]
fn nested_blocks_keep_document_order() {
    let t = parse(
        "{{#orders}}\n\n## {{id}}\n\n{?{paid}}Paid{{else}}Due{{/}}\n\n{{#lines}}\n\n- {{sku}}\n\n{{/lines}}\n\n{{/orders}}\n",
    );
    assert_eq!(
        outline(&t),
        vec![
            (0, "loop"),
            (1, "condition"),
            (2, "then"),
            (2, "else"),
            (1, "loop"),
        ]
    );
}

#[test]
fn dyntable_formatter_selects_dynamic_table() {
    let t = parse("{{#grid:dyntable}}\n\n| {{Header}} |\n|---|\n| {{Cell}} |\n\n{{/grid}}\n");
    assert_eq!(
        t.blocks.children[0].kind,
        BlockKind::DynamicTable {
            path: "grid".into()
        }
    );
}

#[test]
fn range_loop_keeps_index_and_count() {
    let t = parse("{{@i:3}}x{{/}}\n");
    assert_eq!(
        t.blocks.children[0].kind,
        BlockKind::RangeLoop {
            index: "i".into(),
            count: "3".into()
        }
    );
}

#[test]
fn condition_spanning_list_items() {
    let t = parse("- a\n- {?{flag}}b\n- c{{/}}\n- d\n");
    let cond = &t.blocks.children[0];
    assert_eq!(cond.children[0].kind, BlockKind::Branch(BranchKind::Then));
    assert_eq!(t.document.to_string(), "- a\n- d\n");
}

#[test]
fn body_text_outside_blocks_is_untouched() {
    let t = parse("# Invoice {{number}}\n\nPlain paragraph.\n");
    assert!(t.blocks.children.is_empty());
    assert_eq!(t.document.to_string(), "# Invoice {{number}}\n\nPlain paragraph.\n");
}

#[test]
fn fresh_generators_issue_the_same_ids() {
    let a = parse("{{#x}}a{{/}}\n");
    let b = parse("{{#x}}a{{/}}\n");
    assert_eq!(a.blocks.children[0].anchor, b.blocks.children[0].anchor);
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[test]
fn malformed_markup_is_reported() {
    assert!(matches!(
        parse_err("{{#}}\n"),
        TemplateError::Syntax { .. }
    ));
}

#[test]
fn error_carries_source_span() {
    let source = "ok\n\n{{#items}} never closed\n";
    let mut ids = IdGenerator::new();
    let errors = Parser::new(source.to_string(), 0)
        .parse(&mut ids)
        .unwrap_err();
    let span = errors[0].span.clone();
    assert!(source[span].contains("{{#items}}"));
}
