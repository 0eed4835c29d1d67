mod common;

use common::{TestResult, main_template, named_template, run_main, transformer};
use weft::xslt::ast::Grouping;
use weft::xslt::error::codes;
use weft::{Instruction, QName, StylesheetBuilder, XdmItem};

// ============================================================================
// xsl:try / xsl:catch
// ============================================================================

#[test]
fn test_wildcard_catch_binds_the_error_code() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let try_ = b.add(
        main,
        Instruction::Try {
            select: Some(b.xpath("1 div 0")?),
            rollback_output: true,
        },
    );
    let other = b.add(
        try_,
        Instruction::Catch {
            errors: Some(b.name_tests("err:XTDE0700")?),
            select: None,
            error_slots: None,
        },
    );
    b.text(other, "wrong catch");
    b.add(
        try_,
        Instruction::Catch {
            errors: Some(b.name_tests("*")?),
            select: Some(b.xpath("$err:code")?),
            error_slots: None,
        },
    );

    assert_eq!(run_main(&transformer(b.compose()?))?, "err:FOAR0001");
    Ok(())
}

#[test]
fn test_failure_in_called_template_reaches_the_callers_try() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let failing = named_template(&mut b, "failing");
    b.text(failing, "before");
    b.value_of(failing, "error(QName('urn:app', 'app:broken'), 'it broke')")?;

    let main = main_template(&mut b);
    let try_ = b.add(
        main,
        Instruction::Try {
            select: None,
            rollback_output: true,
        },
    );
    b.add(
        try_,
        Instruction::CallTemplate {
            name: QName::local("failing"),
        },
    );
    b.add(
        try_,
        Instruction::Catch {
            errors: Some(b.name_tests("Q{urn:app}broken")?),
            select: Some(b.xpath("$err:description")?),
            error_slots: None,
        },
    );

    assert_eq!(run_main(&transformer(b.compose()?))?, "it broke");
    Ok(())
}

#[test]
fn test_output_streams_without_rollback() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let try_ = b.add(
        main,
        Instruction::Try {
            select: None,
            rollback_output: false,
        },
    );
    b.text(try_, "kept ");
    b.value_of(try_, "1 div 0")?;
    let catch = b.add(
        try_,
        Instruction::Catch {
            errors: None,
            select: None,
            error_slots: None,
        },
    );
    b.text(catch, "recovered");

    assert_eq!(run_main(&transformer(b.compose()?))?, "kept recovered");
    Ok(())
}

#[test]
fn test_catch_before_body_is_rejected() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let try_ = b.add(
        main,
        Instruction::Try {
            select: None,
            rollback_output: true,
        },
    );
    b.add(
        try_,
        Instruction::Catch {
            errors: None,
            select: None,
            error_slots: None,
        },
    );
    b.text(try_, "late");

    let err = run_main(&transformer(b.compose()?)).unwrap_err();
    assert!(err.has_code(codes::XTSE3140), "{err}");
    Ok(())
}

// ============================================================================
// xsl:merge over source documents
// ============================================================================

#[test]
fn test_merge_of_two_sources_runs_once_per_key() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let merge = b.add(main, Instruction::Merge);
    for (name, select) in [("A", "data/a"), ("B", "data/b")] {
        let source = b.add(
            merge,
            Instruction::MergeSource {
                name: Some(name.to_string()),
                select: b.xpath(select)?,
                sort_before_merge: true,
            },
        );
        b.add(
            source,
            Instruction::MergeKey {
                select: b.xpath("number(@k)")?,
                order: Default::default(),
            },
        );
    }
    let action = b.add(merge, Instruction::MergeAction);
    b.value_of(
        action,
        "concat(current-merge-key(), '=', string(current-merge-group()), ';')",
    )?;

    let transformer = transformer(b.compose()?);
    let doc = transformer.parse_document(
        r#"<data><a k="1">a</a><a k="3">c</a><b k="2">b</b></data>"#,
        None,
    )?;
    let output =
        transformer.call_template_to_string(&QName::local("main"), Some(XdmItem::Node(doc)))?;
    assert_eq!(output, "1=a;2=b;3=c;");
    Ok(())
}

#[test]
fn test_merge_key_must_be_a_single_value() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let merge = b.add(main, Instruction::Merge);
    let source = b.add(
        merge,
        Instruction::MergeSource {
            name: None,
            select: b.xpath("(1, 2)")?,
            sort_before_merge: false,
        },
    );
    b.add(
        source,
        Instruction::MergeKey {
            select: b.xpath("(., .)")?,
            order: Default::default(),
        },
    );
    b.add(merge, Instruction::MergeAction);

    let err = run_main(&transformer(b.compose()?)).unwrap_err();
    assert!(err.has_code(codes::XPTY0004), "{err}");
    Ok(())
}

// ============================================================================
// xsl:for-each-group over nodes
// ============================================================================

#[test]
fn test_grouping_nodes_by_attribute() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let group = b.add(
        main,
        Instruction::ForEachGroup {
            select: b.xpath("items/item")?,
            grouping: Grouping::By(b.xpath("@kind")?),
        },
    );
    let element = b.element(group, "kind")?;
    b.value_of(
        element,
        "concat(current-grouping-key(), ':', string-join(current-group(), ','))",
    )?;

    let transformer = transformer(b.compose()?);
    let doc = transformer.parse_document(
        r#"<items><item kind="x">1</item><item kind="y">2</item><item kind="x">3</item></items>"#,
        None,
    )?;
    let output =
        transformer.call_template_to_string(&QName::local("main"), Some(XdmItem::Node(doc)))?;
    assert_eq!(output, "<kind>x:1,3</kind><kind>y:2</kind>");
    Ok(())
}

#[test]
fn test_grouping_key_is_empty_for_starting_with() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let group = b.add(
        main,
        Instruction::ForEachGroup {
            select: b.xpath("(1, 2, 3)")?,
            grouping: Grouping::EndingWith(b.xpath(". = 2")?),
        },
    );
    b.value_of(
        group,
        "concat(count(current-grouping-key()), '/', count(current-group()), ';')",
    )?;

    assert_eq!(run_main(&transformer(b.compose()?))?, "0/2;0/1;");
    Ok(())
}

// ============================================================================
// xsl:fork
// ============================================================================

#[test]
fn test_fork_branches_see_variables_in_scope() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    b.add(
        main,
        Instruction::Variable {
            name: QName::local("n"),
            select: Some(b.xpath("10")?),
            slot: None,
        },
    );
    let fork = b.add(main, Instruction::Fork);
    for select in ["$n + 1", "$n + 2", "$n + 3"] {
        b.sequence(fork, Some(select))?;
    }

    assert_eq!(run_main(&transformer(b.compose()?))?, "111213");
    Ok(())
}

#[test]
fn test_fork_ending_in_grouping_runs_in_order() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let fork = b.add(main, Instruction::Fork);
    b.sequence(fork, Some("'head:'"))?;
    let group = b.add(
        fork,
        Instruction::ForEachGroup {
            select: b.xpath("('a', 'a', 'b')")?,
            grouping: Grouping::Adjacent(b.xpath(".")?),
        },
    );
    b.value_of(group, "count(current-group())")?;

    assert_eq!(run_main(&transformer(b.compose()?))?, "head:21");
    Ok(())
}
