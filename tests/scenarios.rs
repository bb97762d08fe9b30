use paged_flow::breaks::PageSide;
use paged_flow::geometry::FlowGeometry;
use paged_flow::layout::Margins;
use paged_flow::{attrs, Chunker, Page, PaginationConfig, PaginationError, Pt, Ref};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn config(width: f32, height: f32) -> PaginationConfig {
    PaginationConfig::default()
        .with_page_size((Pt(width), Pt(height)))
        .with_margins(Margins::empty())
}

fn page_text(page: &Page) -> String {
    page.rendered.text_content(page.rendered.root())
}

#[test]
fn short_content_takes_one_page() {
    init_logging();
    let geometry = FlowGeometry::default();
    let markup = format!("<h1>Title</h1><p>{}</p>", lipsum::lipsum(12));
    let paginated = Chunker::new(PaginationConfig::default(), &geometry)
        .flow(&markup)
        .expect("can paginate");

    assert_eq!(paginated.page_count(), 1);
    let page = paginated.pages().next().expect("one page");
    assert!(page.start_token.is_none());
    assert!(page.end_token.is_none());
    assert!(page_text(page).starts_with("Title"));
}

#[test]
fn paragraph_that_doesnt_fit_moves_whole() {
    init_logging();
    let geometry = FlowGeometry::default();
    let paginated = Chunker::new(config(60.0, 30.0), &geometry)
        .flow(r#"<p>aaaa bbbb cccc dddd</p><p data-ref="second">eeee ffff gggg hhhh</p>"#)
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(pages.len(), 2);
    assert_eq!(page_text(pages[0]), "aaaa bbbb cccc dddd");
    assert_eq!(pages[0].rendered.elements_by_tag("p").len(), 1);

    let token = pages[1].start_token.as_ref().expect("second page resumes");
    assert_eq!(token.node, Ref::new("second"));
    assert_eq!(token.offset, None);
    assert_eq!(page_text(pages[1]), "eeee ffff gggg hhhh");
}

#[test]
fn rowspan_keeps_spanned_rows_together() {
    init_logging();
    let geometry = FlowGeometry::default();
    let markup = concat!(
        "<table>",
        "<tr><td>r1</td><td>x</td></tr>",
        "<tr><td>r2</td><td>x</td></tr>",
        r#"<tr data-ref="row3"><td rowspan="2">r3</td><td>x</td></tr>"#,
        "<tr><td>r4</td></tr>",
        "</table>"
    );
    let paginated = Chunker::new(config(60.0, 40.0), &geometry)
        .flow(markup)
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(pages.len(), 2);
    let token = pages[0].end_token.as_ref().expect("table continues");
    assert_eq!(token.node, Ref::new("row3"));
    assert_eq!(pages[0].rendered.elements_by_tag("tr").len(), 2);
    assert_eq!(page_text(pages[0]), "r1xr2x");
    assert_eq!(pages[1].rendered.elements_by_tag("tr").len(), 2);
    assert_eq!(page_text(pages[1]), "r3xr4");
}

#[test]
fn left_page_break_inserts_a_blank_page() {
    init_logging();
    let geometry = FlowGeometry::default();
    let paginated = Chunker::new(config(60.0, 24.0), &geometry)
        .flow(concat!(
            "<p>one</p>",
            r#"<p data-break-before="page">two</p>"#,
            r#"<h2 data-break-before="left">three</h2>"#
        ))
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(pages.len(), 4);
    assert_eq!(page_text(pages[1]), "two");
    assert!(pages[2].blank);
    assert!(pages[2].is_empty());
    assert_eq!(page_text(pages[3]), "three");
    assert_eq!(pages[3].number(), 4);
    assert_eq!(pages[3].side(), PageSide::Left);
}

#[test]
fn oversized_image_is_fatal() {
    init_logging();
    let geometry = FlowGeometry::default();
    let err = Chunker::new(config(60.0, 100.0), &geometry)
        .flow(r#"<img data-ref="hero" height="200">"#)
        .expect_err("the image can never fit");

    match err {
        PaginationError::OverflowContent { nodes, .. } => assert_eq!(nodes, vec![Ref::new("hero")]),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn oversized_image_is_skipped_when_content_follows() {
    init_logging();
    let geometry = FlowGeometry::default();
    let paginated = Chunker::new(config(60.0, 100.0), &geometry)
        .flow(r#"<img data-ref="hero" height="200"><p data-ref="after">after</p>"#)
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].rendered.elements_by_tag("img").len(), 1);
    assert!(pages[0].rendered.elements_by_tag("p").is_empty());
    let token = pages[1].start_token.as_ref().expect("resumes after the image");
    assert_eq!(token.node, Ref::new("after"));
    assert_eq!(page_text(pages[1]), "after");
}

#[test]
fn soft_hyphen_becomes_a_visible_hyphen() {
    init_logging();
    let geometry = FlowGeometry::default();
    let paginated = Chunker::new(config(60.0, 24.0), &geometry)
        .flow("<p>aaaa bbbb xxxx exam&shy;ple</p>")
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(pages.len(), 2);
    assert_eq!(page_text(pages[0]), "aaaa bbbb xxxx exam\u{2011}");
    assert_eq!(page_text(pages[1]), "ple");
    assert_eq!(pages[1].start_token.as_ref().and_then(|t| t.offset), Some(20));
}

#[test]
fn long_words_are_hyphenated_mid_word() {
    init_logging();
    let geometry = FlowGeometry::default();
    let paginated = Chunker::new(config(60.0, 12.0), &geometry)
        .flow("<p>abcdefghijklmnop</p>")
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(pages.len(), 2);
    assert_eq!(page_text(pages[0]), "abcdefghij\u{2011}");
    assert_eq!(page_text(pages[1]), "klmnop");
}

#[test]
fn breaks_at_whitespace_add_no_hyphen() {
    init_logging();
    let geometry = FlowGeometry::default();
    let paginated = Chunker::new(config(60.0, 24.0), &geometry)
        .flow("<p>aaaa bbbb cccc dddd eeee</p>")
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(page_text(pages[0]), "aaaa bbbb cccc dddd ");
    assert_eq!(page_text(pages[1]), "eeee");
}

#[test]
fn cells_after_a_broken_cell_flow_to_the_next_page() {
    init_logging();
    let geometry = FlowGeometry::default();
    let paginated = Chunker::new(config(120.0, 24.0), &geometry)
        .flow("<table><tr><td>aaaa bbbb cccc dddd eeee ffff</td><td>XY</td></tr></table>")
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(pages.len(), 2);
    let texts: Vec<String> = pages.iter().map(|page| page_text(page)).collect();
    assert_eq!(texts.iter().map(|text| text.matches("XY").count()).sum::<usize>(), 1);
    assert!(!texts[0].contains("XY"));
    assert!(texts[1].ends_with("XY"));
    assert_eq!(texts.concat(), "aaaa bbbb cccc dddd eeee ffffXY");

    // the row keeps both cells on the first page, the second one empty
    let first = &pages[0].rendered;
    let cells = first.elements_by_tag("td");
    assert_eq!(cells.len(), 2);
    assert!(first.has_attr(cells[1], attrs::SPLIT_TO));
    assert!(first.children(cells[1]).is_empty());
}

#[test]
fn nested_oversized_image_does_not_leave_an_empty_page() {
    init_logging();
    let geometry = FlowGeometry::default();
    let paginated = Chunker::new(config(60.0, 100.0), &geometry)
        .flow(r#"<div><img data-ref="hero" height="200"></div><p data-ref="after">after</p>"#)
        .expect("can paginate");

    let pages: Vec<&Page> = paginated.pages().collect();
    assert_eq!(pages.len(), 2);
    assert_eq!(pages[0].rendered.elements_by_tag("img").len(), 1);
    assert!(pages[0].rendered.elements_by_tag("p").is_empty());
    let token = pages[1].start_token.as_ref().expect("resumes after the image");
    assert_eq!(token.node, Ref::new("after"));
    assert_eq!(page_text(pages[1]), "after");
}
