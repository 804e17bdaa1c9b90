//! Injected-script assets.
//!
//! These expressions are part of the wire protocol: each one is a
//! self-contained immediately-invoked function sent through
//! `Runtime.evaluate` with `returnByValue: true`. Every snippet returns a
//! JSON-serialisable value and signals the not-found case by returning
//! `null` rather than throwing. Arguments are embedded as JSON string
//! literals so selector text can never break out of the expression.

/// Embed a string argument as a JSON literal inside a snippet.
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_owned())
}

/// Set an input's value the way a user edit would: assign through the
/// native setter so framework value-tracking sees it, then fire `input`
/// and `change`.
#[must_use]
pub fn set_value_and_fire_events(selector: &str, value: &str) -> String {
    format!(
        r"(function() {{
  var el = document.querySelector({sel});
  if (!el) return null;
  var proto = el instanceof HTMLTextAreaElement
    ? HTMLTextAreaElement.prototype
    : el instanceof HTMLSelectElement
      ? HTMLSelectElement.prototype
      : HTMLInputElement.prototype;
  var desc = Object.getOwnPropertyDescriptor(proto, 'value');
  if (desc && desc.set) {{ desc.set.call(el, {val}); }} else {{ el.value = {val}; }}
  el.dispatchEvent(new Event('input', {{ bubbles: true }}));
  el.dispatchEvent(new Event('change', {{ bubbles: true }}));
  return {{ value: el.value }};
}})()",
        sel = js_str(selector),
        val = js_str(value),
    )
}

/// Read an element's current value (inputs) or text content (anything else).
#[must_use]
pub fn element_value(selector: &str) -> String {
    format!(
        r"(function() {{
  var el = document.querySelector({sel});
  if (!el) return null;
  if ('value' in el) return {{ value: String(el.value) }};
  return {{ value: el.textContent || '' }};
}})()",
        sel = js_str(selector),
    )
}

/// Computed style of the first match, restricted to the named properties
/// (or a standard set when none are given).
#[must_use]
pub fn computed_style(selector: &str, properties: &[String]) -> String {
    let props = if properties.is_empty() {
        r#"["display","position","width","height","color","background-color","font-size","visibility","opacity"]"#
            .to_owned()
    } else {
        serde_json::to_string(properties).unwrap_or_else(|_| "[]".to_owned())
    };
    format!(
        r"(function() {{
  var el = document.querySelector({sel});
  if (!el) return null;
  var style = getComputedStyle(el);
  var out = {{}};
  for (var name of {props}) {{ out[name] = style.getPropertyValue(name); }}
  return out;
}})()",
        sel = js_str(selector),
    )
}

/// Enumerate forms and their fields: name, type, current value, options.
#[must_use]
pub fn enumerate_forms() -> String {
    r"(function() {
  var forms = [];
  for (var form of document.querySelectorAll('form')) {
    var fields = [];
    for (var el of form.elements) {
      if (!el.name && !el.id) continue;
      var field = {
        name: el.name || el.id,
        type: el.type || el.tagName.toLowerCase(),
        value: String(el.value || ''),
      };
      if (el.tagName === 'SELECT') {
        field.options = Array.from(el.options).map(function(o) { return o.value; });
      }
      if (el.type === 'checkbox' || el.type === 'radio') {
        field.checked = !!el.checked;
      }
      fields.push(field);
    }
    forms.push({
      id: form.id || null,
      name: form.getAttribute('name'),
      action: form.action || '',
      method: (form.method || 'get').toLowerCase(),
      fields: fields,
    });
  }
  return forms;
})()"
        .to_owned()
}

/// Extract a table as an array of row objects keyed by header text (or
/// column index when the table has no header row).
#[must_use]
pub fn extract_table(selector: &str) -> String {
    format!(
        r"(function() {{
  var table = document.querySelector({sel});
  if (!table) return null;
  var headers = Array.from(table.querySelectorAll('thead th, tr:first-child th'))
    .map(function(th) {{ return th.innerText.trim(); }});
  var bodyRows = table.querySelectorAll('tbody tr');
  var rows = bodyRows.length ? Array.from(bodyRows)
    : Array.from(table.querySelectorAll('tr')).slice(headers.length ? 1 : 0);
  return rows.map(function(tr) {{
    var cells = Array.from(tr.querySelectorAll('td, th'));
    var row = {{}};
    cells.forEach(function(td, i) {{
      var key = headers[i] && headers[i].length ? headers[i] : String(i);
      row[key] = td.innerText.trim();
    }});
    return row;
  }});
}})()",
        sel = js_str(selector),
    )
}

/// Find visible elements whose text contains the needle (case-insensitive),
/// reporting tag, trimmed text, and a best-effort CSS path.
#[must_use]
pub fn find_text(needle: &str, limit: usize) -> String {
    format!(
        r"(function() {{
  var needle = {needle}.toLowerCase();
  var walker = document.createTreeWalker(document.body, NodeFilter.SHOW_TEXT);
  var matches = [];
  var node;
  while ((node = walker.nextNode()) && matches.length < {limit}) {{
    var text = node.textContent;
    if (!text || text.toLowerCase().indexOf(needle) === -1) continue;
    var el = node.parentElement;
    if (!el) continue;
    var rect = el.getBoundingClientRect();
    if (rect.width === 0 && rect.height === 0) continue;
    var path = [];
    for (var cur = el; cur && cur !== document.body; cur = cur.parentElement) {{
      var part = cur.tagName.toLowerCase();
      if (cur.id) {{ path.unshift(part + '#' + cur.id); break; }}
      path.unshift(part);
    }}
    matches.push({{ tag: el.tagName.toLowerCase(), text: text.trim(), path: path.join(' > ') }});
  }}
  return matches;
}})()",
        needle = js_str(needle),
    )
}

/// Whole-page visible text, for substring waits.
#[must_use]
pub fn body_inner_text() -> String {
    "(function() { return document.body ? document.body.innerText : ''; })()".to_owned()
}

/// localStorage accessors. Missing keys read as `null`, matching the DOM
/// API.
#[must_use]
pub fn local_storage_get(key: &str) -> String {
    format!(
        "(function() {{ return window.localStorage.getItem({}); }})()",
        js_str(key)
    )
}

#[must_use]
pub fn local_storage_set(key: &str, value: &str) -> String {
    format!(
        "(function() {{ window.localStorage.setItem({}, {}); return true; }})()",
        js_str(key),
        js_str(value)
    )
}

#[must_use]
pub fn local_storage_remove(key: &str) -> String {
    format!(
        "(function() {{ window.localStorage.removeItem({}); return true; }})()",
        js_str(key)
    )
}

#[must_use]
pub fn local_storage_clear() -> String {
    "(function() { window.localStorage.clear(); return true; })()".to_owned()
}

#[must_use]
pub fn local_storage_keys() -> String {
    r"(function() {
  var keys = [];
  for (var i = 0; i < window.localStorage.length; i++) keys.push(window.localStorage.key(i));
  return keys;
})()"
        .to_owned()
}

/// Selector existence check used by the wait loops.
#[must_use]
pub fn selector_exists(selector: &str) -> String {
    format!(
        "(function() {{ return document.querySelector({}) !== null; }})()",
        js_str(selector)
    )
}
