//! Bootstrap page rendering.
//!
//! The page embeds the full file content plus the cursor that the client
//! script passes back when it opens the stream.

use crate::tail::Cursor;

/// Values embedded in the bootstrap page.
#[derive(Debug, Clone)]
pub struct PageData<'a> {
    /// Target file name as shown to the user.
    pub filename: &'a str,
    /// File content (or error text) at request time.
    pub content: &'a str,
    /// Cursor just past `content`.
    pub cursor: Cursor,
    /// Request host, used to build the stream URL.
    pub host: &'a str,
}

/// Render the bootstrap page.
#[must_use]
pub fn render_home(data: &PageData<'_>) -> String {
    fill(
        HOME_HTML,
        &[
            ("title", escape_html(data.filename)),
            ("filename", js_string(data.filename)),
            ("host", js_string(data.host)),
            ("mod_time", js_string(&data.cursor.mod_time.to_string())),
            ("offset", js_string(&data.cursor.offset.to_string())),
            ("data", js_string(data.content)),
        ],
    )
}

/// Substitute `{{name}}` placeholders in one pass.
///
/// Substituted values are never rescanned, and unknown placeholders are
/// left as they are.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            out.push_str(&rest[start..]);
            return out;
        };
        let key = &after[..end];
        match values.iter().find(|(name, _)| *name == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[start..start + 2 + end + 2]),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);
    out
}

/// Escape text for an HTML text node.
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
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

/// Encode text as a JavaScript string literal safe inside `<script>`.
fn js_string(raw: &str) -> String {
    serde_json::Value::from(raw)
        .to_string()
        .replace("</", "<\\/")
}

const HOME_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
	<head>
		<meta charset="UTF-8">
		<meta name="description" content="Frontail: tail follow streaming file to the browser">
		<link rel="icon" href="data:;base64,iVBORw0KGgo=">
		<title>{{title}}</title>
		<style>
			body {
				margin: 0;
				padding: 0;
			}
			header {
				display: flex;
				position: fixed;
				top: 0;
				padding: 20px 0;
				width: 100vw;
				background-color: black;
				color: white;
				font-size: 20px;
				font-family: sans-serif;
				justify-content: space-between;
			}
			#fileData {
				margin-top: 80px;
				padding: 0;
			}
			.log {
				padding: 0 10px;
				margin: 2px 0;
				white-space: pre-wrap;
				color: black;
				font-size: 1em;
				border: 0;
				cursor: default;
			}
			.selected {
				background-color: #ffb2b0;
			}
			#status {
				padding: 0 20px;
				color: #f88;
			}
		</style>
	</head>
	<body>
		<header>
			<div style="padding: 0 20px;">File: {{title}}</div>
			<div id="status"></div>
			<div style="padding: 0 20px;"><input id="filter" placeholder="filter" size="20"></div>
		</header>
		<div id="fileData"></div>
		<script type="text/javascript">
			const filename = {{filename}};
			const host = {{host}};
			const modTime = {{mod_time}};
			const offset = {{offset}};
			var input = {{data}};
			var filter = "";
			var data = document.getElementById("fileData");

			function render() {
				var regex = null;
				if (filter !== "") {
					try {
						regex = new RegExp(filter, "i");
					} catch (e) {
						regex = null;
					}
				}
				data.innerHTML = "";
				var lines = input.split("\n");
				for (var i = 0; i < lines.length; i++) {
					if (regex !== null && !regex.test(lines[i])) {
						continue;
					}
					var elem = document.createElement("div");
					elem.className = "log";
					elem.addEventListener("click", function () {
						this.classList.toggle("selected");
					});
					elem.textContent = lines[i];
					data.appendChild(elem);
				}
				window.scrollTo(0, document.body.scrollHeight);
			}

			document.getElementById("filter").addEventListener("keyup", function () {
				filter = this.value;
				render();
			});
			render();

			// Bytes of the file delivered so far; BigInt keeps large offsets exact.
			var position = BigInt(offset);
			var statusLine = document.getElementById("status");
			var errorPrefix = filename + ": ";
			var encoder = new TextEncoder();
			var retryDelay = 1000;
			var scheme = window.location.protocol === "https:" ? "wss://" : "ws://";

			function connect() {
				var conn = new WebSocket(scheme + host + "/stream?modTime=" + modTime + "&offset=" + position.toString());
				conn.onopen = function () {
					retryDelay = 1000;
				};
				conn.onclose = function () {
					statusLine.textContent = "Connection closed, reconnecting in " + (retryDelay / 1000) + "s";
					setTimeout(connect, retryDelay);
					retryDelay = Math.min(retryDelay * 2, 30000);
				};
				conn.onmessage = function (evt) {
					if (evt.data.startsWith(errorPrefix)) {
						statusLine.textContent = evt.data;
						return;
					}
					statusLine.textContent = "";
					position += BigInt(encoder.encode(evt.data).length);
					input += evt.data;
					render();
				};
			}
			connect();
		</script>
	</body>
</html>
"#;
