//! Visual diff of the specifications fragment between two runs.
//!
//! Lines are diffed first (Myers, no deadline); replaced line blocks are
//! refined to character level. No clocks or randomness are involved, so
//! equal inputs always render byte-identical output.

use html_escape::encode_text;
use similar::{Algorithm, ChangeTag, DiffTag, TextDiff};

/// Render the diff body: `<span>` for kept text, `<del>`/`<ins>` for edits.
pub fn render_fragment(old: &str, new: &str) -> String {
    let lines = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_lines(old, new);

    let mut runs: Vec<(ChangeTag, String)> = Vec::new();
    for op in lines.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        if tag == DiffTag::Replace {
            let old_block = lines.old_slices()[old_range].concat();
            let new_block = lines.new_slices()[new_range].concat();
            let chars = TextDiff::configure()
                .algorithm(Algorithm::Myers)
                .diff_chars(&old_block, &new_block);
            for change in chars.iter_all_changes() {
                push_run(&mut runs, change.tag(), change.value());
            }
        } else {
            for change in lines.iter_changes(op) {
                push_run(&mut runs, change.tag(), change.value());
            }
        }
    }

    let mut out = String::from("<pre class=\"spec-diff\">");
    for (tag, text) in &runs {
        let element = match tag {
            ChangeTag::Equal => "span",
            ChangeTag::Delete => "del",
            ChangeTag::Insert => "ins",
        };
        out.push_str(&format!("<{0}>{1}</{0}>", element, encode_text(text)));
    }
    out.push_str("</pre>");
    out
}

fn push_run(runs: &mut Vec<(ChangeTag, String)>, tag: ChangeTag, value: &str) {
    match runs.last_mut() {
        Some((last, text)) if *last == tag => text.push_str(value),
        _ => runs.push((tag, value.to_string())),
    }
}

/// Wrap a rendered fragment in a standalone report page.
pub fn render_report(fragment: &str, target_name: &str) -> String {
    let title = format!("Change report for {}", encode_text(target_name));
    format!(
        r#"<!DOCTYPE html><html lang="en"><head><meta charset="UTF-8">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; line-height: 1.6; color: #333; }}
.container {{ max-width: 90%; margin: 20px auto; padding: 20px; border: 1px solid #ddd; border-radius: 5px; }}
h1 {{ color: #555; }}
pre.spec-diff {{ white-space: pre-wrap; }}
del {{ background-color: #fdd; text-decoration: none; padding: 2px 0; }}
ins {{ background-color: #dfd; text-decoration: none; padding: 2px 0; }}
</style></head><body><div class="container">
<h1>{title}</h1><hr>
<p>Differences found in the specifications section are highlighted below.</p>
<div>{fragment}</div></div></body></html>"#
    )
}
