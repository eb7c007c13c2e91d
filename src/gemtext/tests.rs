use super::*;

#[test]
fn classifies_each_line_kind() {
    assert_eq!(classify_line(""), LineKind::Blank);
    assert_eq!(classify_line("   "), LineKind::Blank);
    assert_eq!(classify_line("# Heading"), LineKind::Heading1);
    assert_eq!(classify_line("## Heading"), LineKind::Heading2);
    assert_eq!(classify_line("### Heading"), LineKind::Heading3);
    assert_eq!(classify_line("```alt text"), LineKind::Preformatted);
    assert_eq!(classify_line("=> gemini://a/x link"), LineKind::Link);
    assert_eq!(classify_line("> quoted"), LineKind::Quote);
    assert_eq!(classify_line("* bullet"), LineKind::Bullet);
    assert_eq!(classify_line("plain words"), LineKind::Text);
    // A bullet needs the trailing space.
    assert_eq!(classify_line("*bold*"), LineKind::Text);
}

#[test]
fn scans_authors_out_of_urls() {
    assert_eq!(
        scan_author("gemini://example.org/~alice/post.gmi").as_deref(),
        Some("~alice")
    );
    assert_eq!(
        scan_author("gemini://example.org/users/bob/post.gmi").as_deref(),
        Some("bob")
    );
    assert_eq!(
        scan_author("gemini://example.org/USER/carol/post.gmi").as_deref(),
        Some("carol")
    );
    // The tilde form wins when both are present.
    assert_eq!(
        scan_author("gemini://example.org/users/bob/~alice").as_deref(),
        Some("~alice")
    );
    assert_eq!(scan_author("gemini://example.org/post.gmi"), None);
}

#[test]
fn infers_fields_from_page_content() {
    let body = "\
# A fine title
Some opening words.
More words that are not the summary.
";
    let post = parse_post("gemini://example.org/~alice/post.gmi", body)
        .expect("parse should work");
    assert!(post.allowed);
    assert_eq!(post.author, "~alice");
    assert_eq!(post.title, "A fine title");
    assert_eq!(post.summary.as_deref(), Some("Some opening words."));
}

#[test]
fn falls_back_to_host_and_untitled() {
    let post = parse_post("gemini://example.org/post.gmi", "=> gemini://a link only\n")
        .expect("parse should work");
    assert_eq!(post.author, "example.org");
    assert_eq!(post.title, "Untitled");
    assert_eq!(post.summary, None);
}

#[test]
fn only_the_first_heading_names_the_title() {
    let body = "## Second level first\n# Top level later\n";
    let post = parse_post("gemini://example.org/p", body).expect("parse should work");
    assert_eq!(post.title, "Second level first");
}

#[test]
fn directives_override_inferred_fields() {
    let body = "\
# Ignored title
first line
gemloom:author: The Real Author
gemloom-title: Directive Title
gemloom_summary: Directive summary text
";
    let post = parse_post("gemini://example.org/~alice/p", body).expect("parse should work");
    assert_eq!(post.author, "The Real Author");
    assert_eq!(post.title, "Directive Title");
    assert_eq!(post.summary.as_deref(), Some("Directive summary text"));
}

#[test]
fn directives_are_case_insensitive() {
    let body = "GEMLOOM:AUTHOR: shouty\n";
    let post = parse_post("gemini://example.org/p", body).expect("parse should work");
    assert_eq!(post.author, "shouty");
}

#[test]
fn directive_lines_are_not_the_summary() {
    let body = "gemloom:title: Named\nactual first text\n";
    let post = parse_post("gemini://example.org/p", body).expect("parse should work");
    assert_eq!(post.title, "Named");
    assert_eq!(post.summary.as_deref(), Some("actual first text"));
}

#[test]
fn preformatted_blocks_are_skipped() {
    let body = "\
```
# not a title
gemloom:prohibit
code line
```
# The title
real summary
";
    let post = parse_post("gemini://example.org/p", body).expect("parse should work");
    assert!(post.allowed);
    assert_eq!(post.title, "The title");
    assert_eq!(post.summary.as_deref(), Some("real summary"));
}

#[test]
fn prohibit_clears_the_post() {
    let body = "# A title\nsome words\ngemloom:prohibit\n";
    let post = parse_post("gemini://example.org/~alice/p", body).expect("parse should work");
    assert!(!post.allowed);
    assert_eq!(post.author, "");
    assert_eq!(post.title, "");
    assert_eq!(post.summary, None);
}

#[test]
fn an_invalid_url_is_a_parse_error() {
    let err = parse_post("not a url", "# title\n").expect_err("parse should fail");
    assert!(matches!(err, ParseError::InvalidUrl(_)));
}
