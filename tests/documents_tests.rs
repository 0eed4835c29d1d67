mod common;

use common::{BASE, TestResult, main_template, run_main, transformer};
use std::sync::Arc;
use weft::xslt::error::codes;
use weft::xslt::diagnostics::Severity;
use weft::{
    ForkExecutor, InMemoryResourceProvider, InMemoryResultSink, Instruction, OutputMethod,
    OutputProperties, QName, StylesheetBuilder,
};

// ============================================================================
// xsl:result-document
// ============================================================================

fn result_document(
    b: &mut StylesheetBuilder,
    parent: weft::xslt::NodeId,
    href: &str,
) -> Result<weft::xslt::NodeId, weft::XsltError> {
    let href = b.avt(href)?;
    Ok(b.add(
        parent,
        Instruction::ResultDocument {
            href: Some(href),
            format: None,
            method: None,
        },
    ))
}

#[test]
fn test_result_document_is_written_to_the_sink() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    b.text(main, "principal");
    let doc = result_document(&mut b, main, "out/{1 + 1}.xml")?;
    let element = b.element(doc, "doc")?;
    b.text(element, "hi");

    let sink = Arc::new(InMemoryResultSink::new());
    let transformer = transformer(b.compose()?).with_result_sink(sink.clone());

    assert_eq!(run_main(&transformer)?, "principal");
    assert_eq!(sink.uris(), vec![format!("{BASE}out/2.xml")]);
    assert_eq!(
        sink.get_string(&format!("{BASE}out/2.xml")).as_deref(),
        Some("<doc>hi</doc>")
    );
    Ok(())
}

#[test]
fn test_result_document_uri_written_twice_fails() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    for _ in 0..2 {
        let doc = result_document(&mut b, main, "same.xml")?;
        b.text(doc, "x");
    }

    let transformer =
        transformer(b.compose()?).with_result_sink(Arc::new(InMemoryResultSink::new()));
    let err = run_main(&transformer).unwrap_err();
    assert!(err.has_code(codes::XTDE1490), "{err}");
    Ok(())
}

#[test]
fn test_result_document_requires_a_sink() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    result_document(&mut b, main, "nowhere.xml")?;

    let err = run_main(&transformer(b.compose()?)).unwrap_err();
    assert!(err.has_code(codes::XTDE1480), "{err}");
    Ok(())
}

#[test]
fn test_nested_result_document_to_the_active_uri_fails() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let outer = result_document(&mut b, main, "loop.xml")?;
    result_document(&mut b, outer, "loop.xml")?;

    let transformer =
        transformer(b.compose()?).with_result_sink(Arc::new(InMemoryResultSink::new()));
    let err = run_main(&transformer).unwrap_err();
    assert!(err.has_code(codes::XTDE1500), "{err}");
    Ok(())
}

fn rollback_try(
    b: &mut StylesheetBuilder,
    parent: weft::xslt::NodeId,
) -> weft::xslt::NodeId {
    b.add(
        parent,
        Instruction::Try {
            select: None,
            rollback_output: true,
        },
    )
}

fn catch_all(b: &mut StylesheetBuilder, try_: weft::xslt::NodeId) -> weft::xslt::NodeId {
    b.add(
        try_,
        Instruction::Catch {
            errors: None,
            select: None,
            error_slots: None,
        },
    )
}

#[test]
fn test_catch_may_rewrite_a_failed_result_document() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let try_ = rollback_try(&mut b, main);
    let failed = result_document(&mut b, try_, "out.xml")?;
    b.text(failed, "partial");
    b.value_of(failed, "1 div 0")?;
    let catch = catch_all(&mut b, try_);
    let recovered = result_document(&mut b, catch, "out.xml")?;
    b.text(recovered, "recovered");

    let sink = Arc::new(InMemoryResultSink::new());
    let transformer = transformer(b.compose()?).with_result_sink(sink.clone());
    run_main(&transformer)?;
    assert_eq!(
        sink.get_string(&format!("{BASE}out.xml")).as_deref(),
        Some("recovered")
    );
    Ok(())
}

#[test]
fn test_rolled_back_try_discards_completed_result_documents() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let try_ = rollback_try(&mut b, main);
    let done = result_document(&mut b, try_, "done.xml")?;
    b.text(done, "complete");
    b.value_of(try_, "1 div 0")?;
    let catch = catch_all(&mut b, try_);
    b.text(catch, "caught");

    let sink = Arc::new(InMemoryResultSink::new());
    let transformer = transformer(b.compose()?).with_result_sink(sink.clone());
    assert_eq!(run_main(&transformer)?, "caught");
    assert!(sink.uris().is_empty());
    Ok(())
}

fn fork_writing(second: &str) -> Result<StylesheetBuilder, weft::XsltError> {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let fork = b.add(main, Instruction::Fork);
    let branch = b.sequence(fork, None)?;
    let doc = result_document(&mut b, branch, "branch.xml")?;
    b.text(doc, "first");
    let branch = b.sequence(fork, None)?;
    if second == "same" {
        let doc = result_document(&mut b, branch, "branch.xml")?;
        b.text(doc, "second");
    } else {
        b.value_of(branch, second)?;
    }
    Ok(b)
}

#[test]
fn test_failed_fork_writes_no_result_documents() -> TestResult {
    for executor in [ForkExecutor::Sync, ForkExecutor::Rayon] {
        let sink = Arc::new(InMemoryResultSink::new());
        let transformer = weft::Transformer::new(fork_writing("1 div 0")?.compose()?)
            .with_config(common::config().with_fork_executor(executor))
            .with_result_sink(sink.clone());
        let err = run_main(&transformer).unwrap_err();
        assert!(err.has_code(codes::FOAR0001), "{err}");
        assert!(sink.uris().is_empty());
    }
    Ok(())
}

#[test]
fn test_fork_branches_share_the_written_uris() -> TestResult {
    let sink = Arc::new(InMemoryResultSink::new());
    let clashing =
        transformer(fork_writing("same")?.compose()?).with_result_sink(sink.clone());
    let err = run_main(&clashing).unwrap_err();
    assert!(err.has_code(codes::XTDE1490), "{err}");
    assert!(sink.uris().is_empty());

    let sink = Arc::new(InMemoryResultSink::new());
    let distinct =
        transformer(fork_writing("'ok'")?.compose()?).with_result_sink(sink.clone());
    assert_eq!(run_main(&distinct)?, "ok");
    assert_eq!(sink.uris(), vec![format!("{BASE}branch.xml")]);
    Ok(())
}

#[test]
fn test_default_href_targets_the_principal_output() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let doc = result_document(&mut b, main, "#default")?;
    let element = b.element(doc, "inline")?;
    b.text(element, "here");

    let sink = Arc::new(InMemoryResultSink::new());
    let transformer = transformer(b.compose()?).with_result_sink(sink.clone());
    assert_eq!(run_main(&transformer)?, "<inline>here</inline>");
    assert!(sink.uris().is_empty());
    Ok(())
}

#[test]
fn test_named_output_format_applies() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let root = b.root();
    b.add(
        root,
        Instruction::Output {
            name: Some(QName::local("plain")),
            properties: OutputProperties::default().with_method(OutputMethod::Text),
        },
    );
    let main = main_template(&mut b);
    let doc = b.add(
        main,
        Instruction::ResultDocument {
            href: Some(b.avt("report.txt")?),
            format: Some(QName::local("plain")),
            method: None,
        },
    );
    let element = b.element(doc, "ignored")?;
    b.text(element, "a < b");

    let sink = Arc::new(InMemoryResultSink::new());
    let transformer = transformer(b.compose()?).with_result_sink(sink.clone());
    run_main(&transformer)?;
    assert_eq!(
        sink.get_string(&format!("{BASE}report.txt")).as_deref(),
        Some("a < b")
    );
    Ok(())
}

#[test]
fn test_unknown_output_format_is_an_error() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    b.add(
        main,
        Instruction::ResultDocument {
            href: Some(b.avt("x.xml")?),
            format: Some(QName::local("missing")),
            method: None,
        },
    );

    let transformer =
        transformer(b.compose()?).with_result_sink(Arc::new(InMemoryResultSink::new()));
    let err = run_main(&transformer).unwrap_err();
    assert!(err.has_code(codes::XTDE1460), "{err}");
    Ok(())
}

#[test]
fn test_json_result_documents_are_checked() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let good = b.add(
        main,
        Instruction::ResultDocument {
            href: Some(b.avt("good.json")?),
            format: None,
            method: Some(OutputMethod::Json),
        },
    );
    b.text(good, r#"{"total": 3}"#);

    let sink = Arc::new(InMemoryResultSink::new());
    let transformer = transformer(b.compose()?).with_result_sink(sink.clone());
    run_main(&transformer)?;
    let written = sink.get_string(&format!("{BASE}good.json")).unwrap_or_default();
    let parsed: serde_json::Value = serde_json::from_str(&written)?;
    assert_eq!(parsed["total"], 3);

    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let bad = b.add(
        main,
        Instruction::ResultDocument {
            href: Some(b.avt("bad.json")?),
            format: None,
            method: Some(OutputMethod::Json),
        },
    );
    b.text(bad, "{ not json");
    let transformer =
        common::transformer(b.compose()?).with_result_sink(Arc::new(InMemoryResultSink::new()));
    let err = run_main(&transformer).unwrap_err();
    assert!(err.has_code(codes::FOJS0001), "{err}");
    Ok(())
}

#[test]
fn test_character_maps_apply_to_the_principal_output() -> TestResult {
    let mut b = StylesheetBuilder::new();
    let root = b.root();
    let map = b.add(
        root,
        Instruction::CharacterMap {
            name: QName::local("symbols"),
            use_character_maps: Vec::new(),
        },
    );
    b.add(
        map,
        Instruction::OutputCharacter {
            character: '©',
            string: "(c)".to_string(),
        },
    );
    b.add(
        root,
        Instruction::Output {
            name: None,
            properties: OutputProperties::default()
                .with_omit_xml_declaration(true)
                .with_character_maps(vec![QName::local("symbols")]),
        },
    );
    let main = main_template(&mut b);
    let element = b.element(main, "p")?;
    b.text(element, "© 2026");

    assert_eq!(run_main(&transformer(b.compose()?))?, "<p>(c) 2026</p>");
    Ok(())
}

// ============================================================================
// xsl:source-document
// ============================================================================

fn source_document(href: &str, streamable: bool) -> Result<StylesheetBuilder, weft::XsltError> {
    let mut b = StylesheetBuilder::new();
    let main = main_template(&mut b);
    let source = b.add(
        main,
        Instruction::SourceDocument {
            href: b.avt(href)?,
            streamable,
        },
    );
    b.value_of(source, "count(r/x)")?;
    Ok(b)
}

#[test]
fn test_source_document_loads_through_the_provider() -> TestResult {
    let provider = InMemoryResourceProvider::new()
        .with(format!("{BASE}in.xml"), "<r><x>1</x><x>2</x></r>")?;
    let transformer =
        transformer(source_document("in.xml", false)?.compose()?).with_resource_provider(Arc::new(provider));

    assert_eq!(run_main(&transformer)?, "2");
    assert!(transformer.dtm().cached(&format!("{BASE}in.xml")).is_some());
    Ok(())
}

#[test]
fn test_missing_source_document_is_a_warning() -> TestResult {
    let transformer = transformer(source_document("absent.xml", false)?.compose()?)
        .with_resource_provider(Arc::new(InMemoryResourceProvider::new()));

    assert_eq!(run_main(&transformer)?, "");
    let warnings: Vec<_> = transformer
        .diagnostics()
        .into_iter()
        .filter(|d| d.severity == Severity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].message.contains("absent.xml"));
    Ok(())
}

#[test]
fn test_streamable_source_needs_streaming_input() -> TestResult {
    let provider =
        InMemoryResourceProvider::new().with(format!("{BASE}in.xml"), "<r><x>1</x></r>")?;
    let stylesheet = Arc::new(source_document("in.xml", true)?.compose()?);

    let err = run_main(
        &weft::Transformer::new(Arc::clone(&stylesheet))
            .with_config(common::config())
            .with_resource_provider(Arc::new(provider)),
    )
    .unwrap_err();
    assert!(err.has_code(codes::XTTE0505), "{err}");

    let provider =
        InMemoryResourceProvider::new().with(format!("{BASE}in.xml"), "<r><x>1</x></r>")?;
    let streaming = weft::Transformer::new(stylesheet)
        .with_config(common::config().with_streaming_input(true))
        .with_resource_provider(Arc::new(provider));
    assert_eq!(run_main(&streaming)?, "1");
    Ok(())
}
