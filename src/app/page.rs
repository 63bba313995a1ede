use crate::audit::AuditReport;
use crate::findings::GenerationOutcome;
use crate::report::CSV_HEADER;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 72rem; margin: 2rem auto; padding: 0 1rem; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1px solid #ccc; padding: .4rem; text-align: left; vertical-align: top; }
pre { white-space: pre-wrap; background: #f6f6f6; padding: 1rem; }
.error { color: #a00; }
"#;

pub fn form_page(default_models: &[String]) -> String {
    let models = escape_html(&default_models.join(", "));
    layout(
        "siteaudit",
        &format!(
            r#"<h1>siteaudit</h1>
<form method="post" action="/audit">
  <p><label>Website URL <input name="url" size="60" placeholder="www.example.com" required></label></p>
  <p><label>Pages to scan <input name="max_pages" type="number" min="1" max="{max}" value="6"></label></p>
  <p><label>Models (priority order) <input name="models" size="60" value="{models}"></label></p>
  <p><label><input name="strip_fragments" type="checkbox"> Treat <code>#fragment</code> links as the same page</label></p>
  <p><button type="submit">Run audit</button></p>
</form>"#,
            max = super::form::MAX_PAGES_LIMIT,
        ),
    )
}

pub fn report_page(report: &AuditReport) -> String {
    let mut body = format!(
        "<h1>SEO audit: {}</h1>\n<p>{} pages scanned, {} failed fetches.</p>\n",
        escape_html(&report.seed),
        report.pages.len(),
        report.failed_pages
    );

    body.push_str("<h2>Pages</h2>\n<table>\n<tr><th>URL</th><th>Title</th><th>H1</th><th>Description</th></tr>\n");
    for page in &report.pages {
        body.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
            escape_html(&page.url),
            escape_html(page.title.as_str()),
            escape_html(page.heading.as_str()),
            escape_html(page.description.as_str()),
        ));
    }
    body.push_str("</table>\n");

    match &report.findings {
        None => body.push_str(
            "<p class=\"error\">No pages could be fetched, so no findings were generated.</p>\n",
        ),
        Some(findings) => {
            body.push_str("<h2>Executive summary</h2>\n");
            body.push_str(&outcome_block(&findings.summary));

            body.push_str("<h2>Remediation plan</h2>\n");
            if findings.rows.is_empty() {
                body.push_str(&outcome_block(&findings.table));
            } else {
                body.push_str("<table>\n<tr>");
                for column in CSV_HEADER {
                    body.push_str(&format!("<th>{column}</th>"));
                }
                body.push_str("</tr>\n");
                for row in &findings.rows {
                    body.push_str(&format!(
                        "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>\n",
                        escape_html(&row.url),
                        escape_html(&row.error_type),
                        escape_html(&row.current_value),
                        escape_html(&row.recommended_fix),
                        escape_html(&row.priority),
                    ));
                }
                body.push_str("</table>\n");
                body.push_str(&format!(
                    "<h3>CSV</h3>\n<pre>{}</pre>\n",
                    escape_html(&crate::report::to_csv(&findings.rows))
                ));
            }
        }
    }

    body.push_str("<p><a href=\"/\">Run another audit</a></p>\n");
    layout("siteaudit report", &body)
}

pub fn error_page(message: &str) -> String {
    layout(
        "siteaudit error",
        &format!(
            "<h1>Audit failed</h1>\n<p class=\"error\">{}</p>\n<p><a href=\"/\">Back</a></p>",
            escape_html(message)
        ),
    )
}

fn outcome_block(outcome: &GenerationOutcome) -> String {
    match outcome {
        GenerationOutcome::Generated { model, text } => format!(
            "<pre>{}</pre>\n<p><small>model: {}</small></p>\n",
            escape_html(text.trim()),
            escape_html(model)
        ),
        GenerationOutcome::NoEndpointAvailable { failures } => {
            let mut out =
                String::from("<p class=\"error\">No model endpoint was available.</p>\n<ul>\n");
            for failure in failures {
                out.push_str(&format!(
                    "<li>{}: {}</li>\n",
                    escape_html(&failure.model),
                    escape_html(&failure.error)
                ));
            }
            out.push_str("</ul>\n");
            out
        }
    }
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head><meta charset="utf-8"><title>{title}</title><style>{STYLE}</style></head>
  <body>
{body}
  </body>
</html>
"#,
        title = escape_html(title),
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
