//! Server-rendered HTML for the control panel.
//!
//! Plain `format!` templates; the only dynamic values are the state
//! snapshot and fixed notices, and all of them go through [`escape`].

use crate::scheduler::SchedulerStatus;
use crate::state::WatchState;

const STYLE: &str = "\
body{font-family:sans-serif;background:#f4f4f9;margin:0;padding:0;display:flex;justify-content:center;align-items:center;min-height:100vh;}\
.container{background:white;padding:20px;border-radius:10px;box-shadow:0 0 15px rgba(0,0,0,0.2);width:90%;max-width:520px;}\
input[type=text],input[type=password],textarea{width:100%;box-sizing:border-box;padding:10px;margin:5px 0;border-radius:5px;border:1px solid #ccc;}\
button{padding:10px 20px;border:none;background:#4CAF50;color:white;border-radius:5px;cursor:pointer;}\
button.danger{background:#c0392b;}\
p.error{color:#c0392b;text-align:center;}\
p.notice{color:#2e7d32;text-align:center;}\
dl{display:grid;grid-template-columns:max-content auto;gap:4px 12px;font-size:0.9em;word-break:break-all;}";

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\">\
<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\
<title>subwatch</title><style>{STYLE}</style></head>\
<body><div class=\"container\">{body}</div></body></html>"
    )
}

pub fn render_login(error: Option<&str>) -> String {
    let error = error
        .map(|e| format!("<p class=\"error\">{}</p>", escape(e)))
        .unwrap_or_default();
    layout(&format!(
        "<h2>subwatch panel</h2>\
<form method=\"post\" action=\"/login\">\
<input type=\"password\" name=\"password\" placeholder=\"Password\" autofocus>\
<button type=\"submit\">Log in</button></form>{error}"
    ))
}

pub fn render_panel(state: &WatchState, status: Option<&SchedulerStatus>, notice: Option<&str>) -> String {
    let notice = notice
        .map(|n| format!("<p class=\"notice\">{}</p>", escape(n)))
        .unwrap_or_default();
    let or_dash = |s: &str| if s.is_empty() { "—".to_string() } else { escape(s) };
    let updated = state
        .last_updated_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "—".into());
    let scheduler = status
        .map(|s| {
            format!(
                "<dt>Cycles</dt><dd>{}</dd><dt>Failures in a row</dt><dd>{}</dd><dt>Last cycle</dt><dd>{}</dd>",
                s.cycles,
                s.consecutive_failures,
                escape(s.last_outcome.as_deref().unwrap_or("—"))
            )
        })
        .unwrap_or_default();

    layout(&format!(
        "<h2>subwatch panel</h2>{notice}\
<form method=\"post\" action=\"/send\">\
<textarea name=\"message\" rows=\"3\" placeholder=\"Message to post\"></textarea>\
<button type=\"submit\">Send</button></form>\
<h3>State</h3><dl>\
<dt>Last link</dt><dd>{link}</dd>\
<dt>Fingerprint</dt><dd>{hash}</dd>\
<dt>Updated</dt><dd>{updated}</dd>{scheduler}</dl>\
<form method=\"post\" action=\"/reset\">\
<button type=\"submit\" class=\"danger\">Reset (republish current document)</button></form>\
<p><a href=\"/logout\">Log out</a></p>",
        link = or_dash(&state.last_link),
        hash = or_dash(&state.last_fingerprint),
    ))
}

pub fn render_error(message: &str) -> String {
    layout(&format!(
        "<h2>Something went wrong</h2><p class=\"error\">{}</p><p><a href=\"/panel\">Back</a></p>",
        escape(message)
    ))
}
