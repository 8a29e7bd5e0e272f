use anyhow::Result;
use headless_chrome::Tab;
use std::sync::Arc;

use crate::types::DOM_SNAPSHOT_MAX_CHARS;

/// JavaScript injected into the page to produce the indexed UI element list.
/// NON-DESTRUCTIVE: reads the DOM without modifying styles or layout.
///
/// The script:
///   1. Skips script, style, noscript, svg elements (does NOT remove them).
///   2. Walks the visible DOM tree (max depth 15).
///   3. Assigns sequential indices [0], [1], ... to interactive elements
///      (a, button, input, textarea, select) via data-idx attributes.
///   4. Emits a compact one-line-per-element text representation.
const INDEX_JS: &str = r#"
(() => {
  const SKIP = new Set(['SCRIPT','STYLE','NOSCRIPT','SVG','LINK']);
  let idx = 0;
  const lines = [];
  const seen = new Set();

  function isVisible(el) {
    if (el.offsetParent === null && el.tagName !== 'BODY' && el.tagName !== 'HTML') return false;
    const s = getComputedStyle(el);
    return s.display !== 'none' && s.visibility !== 'hidden' && s.opacity !== '0';
  }

  function walk(node, depth) {
    if (depth > 15) return;
    for (const child of node.children) {
      if (SKIP.has(child.tagName)) continue;
      if (!isVisible(child)) continue;
      const tag = child.tagName.toLowerCase();
      const interactive = ['a','button','input','textarea','select'].includes(tag);

      if (interactive) {
        const n = idx++;
        child.setAttribute('data-idx', n);
        const label = '[' + n + ']';
        let desc = '';
        if (tag === 'a') {
          desc = label + ' link "' + (child.textContent||'').trim().slice(0,60) + '"';
        } else if (tag === 'input' || tag === 'textarea') {
          desc = label + ' ' + tag + ' type=' + (child.type||'text') + ' placeholder="' + (child.placeholder||'') + '"';
          if (child.name) desc += ' name=' + child.name;
          if (child.value) desc += ' value="' + child.value.slice(0,30) + '"';
        } else if (tag === 'button') {
          desc = label + ' button "' + (child.textContent||'').trim().slice(0,60) + '"';
        } else if (tag === 'select') {
          const opts = [...child.options].map(o => o.text.trim().slice(0,20)).join('|');
          desc = label + ' select [' + opts + ']';
        }
        if (desc && !seen.has(desc)) {
          seen.add(desc);
          lines.push(desc);
        }
      } else {
        const text = child.textContent ? child.textContent.trim() : '';
        if (text && text.length > 2 && text.length < 200 && child.children.length === 0) {
          const t = text.slice(0, 100);
          if (!seen.has(t)) {
            seen.add(t);
            lines.push('  "' + t + '"');
          }
        }
      }
      walk(child, depth + 1);
    }
  }

  walk(document.body, 0);
  return lines.join('\n');
})()
"#;

/// Capture the indexed interactive-element list from the current page.
pub fn indexed_elements(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate(INDEX_JS, false)?;
    let raw = result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default();

    Ok(truncate_snapshot(raw))
}

fn truncate_snapshot(raw: String) -> String {
    if raw.len() <= DOM_SNAPSHOT_MAX_CHARS {
        return raw;
    }

    // Back up to a char boundary so CJK pages don't split a character.
    let mut cut = DOM_SNAPSHOT_MAX_CHARS;
    while !raw.is_char_boundary(cut) {
        cut -= 1;
    }

    format!(
        "{}\n... [truncated, {} total chars]",
        &raw[..cut],
        raw.len()
    )
}

/// Get the current page URL.
pub fn current_url(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate("window.location.href", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "unknown".to_string()))
}

/// Get the current page title.
pub fn page_title(tab: &Arc<Tab>) -> Result<String> {
    let result = tab.evaluate("document.title", false)?;
    Ok(result
        .value
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_else(|| "untitled".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_snapshots_pass_through_unchanged() {
        let raw = "[0] link \"Home\"".to_string();
        assert_eq!(truncate_snapshot(raw.clone()), raw);
    }

    #[test]
    fn multibyte_snapshots_truncate_at_a_char_boundary() {
        // 4000 three-byte chars; the byte limit lands mid-character.
        let raw = "あ".repeat(4000);
        let out = truncate_snapshot(raw);

        assert!(out.contains("truncated"));
        assert!(out.contains("12000 total chars"));

        let kept = out.split('\n').next().unwrap();
        assert!(kept.len() <= DOM_SNAPSHOT_MAX_CHARS);
        assert!(kept.chars().all(|c| c == 'あ'));
    }

    #[test]
    fn long_snapshots_are_truncated_with_a_marker() {
        let raw = "x".repeat(DOM_SNAPSHOT_MAX_CHARS + 100);
        let out = truncate_snapshot(raw);
        assert!(out.starts_with(&"x".repeat(DOM_SNAPSHOT_MAX_CHARS)));
        assert!(out.contains("truncated"));
        assert!(out.contains(&(DOM_SNAPSHOT_MAX_CHARS + 100).to_string()));
    }
}
