use handlebars::html_escape;

use crate::render::markup::page_shell;

/// One line of the index page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub name: String,
    pub identifier: String,
    pub href: String,
}

/// HTML listing of the generated slips, in input order.
pub fn render_index(title: &str, entries: &[IndexEntry]) -> String {
    let mut rows = String::new();
    for (i, entry) in entries.iter().enumerate() {
        rows.push_str(&format!(
            r#"<tr><td>{}</td><td>{}</td><td>{}</td><td><a href="{}" target="_blank">Open</a></td></tr>"#,
            i + 1,
            html_escape(&entry.name),
            html_escape(&entry.identifier),
            html_escape(&entry.href),
        ));
    }

    page_shell(&format!(
        concat!(
            "<h1>{title}</h1><p>{count} slip(s) generated.</p>",
            "<table border=\"1\" cellpadding=\"6\" cellspacing=\"0\">",
            "<thead><tr><th>#</th><th>Name</th><th>Identifier</th><th>Slip</th></tr></thead>",
            "<tbody>{rows}</tbody></table>"
        ),
        title = html_escape(title),
        count = entries.len(),
        rows = rows,
    ))
}
