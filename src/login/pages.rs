//! Minimal HTML pages for the browser side of the login.

use crate::platform::Profile;
use crate::types::SessionId;

/// QR page: fetches a code, then polls its status every 2 s.
///
/// Inside the WeChat in-app browser it also offers the consent link.
pub(super) fn login_page(base_path: &str, consent: bool) -> String {
    let base = escape_html(base_path);
    let consent_block = if consent {
        r##"<p id="wx-auth" hidden><a href="#">Or authorize inside WeChat to share your UnionID</a></p>"##
    } else {
        ""
    };
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Scan to log in</title></head>
<body data-base="{base}">
<h3>Scan with WeChat to log in</h3>
<div id="qr"></div>
<div id="status">Waiting for scan...</div>
{consent_block}
<script>
(async function () {{
  const base = document.body.dataset.base;
  const res = await fetch(base + '/qr');
  if (!res.ok) {{
    document.getElementById('status').innerText = 'Could not create a login code.';
    return;
  }}
  const data = await res.json();
  const img = document.createElement('img');
  img.src = data.artifact;
  img.style.width = '240px';
  document.getElementById('qr').appendChild(img);
  const sid = encodeURIComponent(data.sid);

  const auth = document.getElementById('wx-auth');
  if (auth && navigator.userAgent.indexOf('MicroMessenger') !== -1) {{
    auth.querySelector('a').href = base + '/consent?sid=' + sid;
    auth.hidden = false;
  }}

  async function poll() {{
    const r = await fetch(base + '/status?sid=' + sid);
    const s = await r.json();
    if (s.status === 'scanned') {{
      document.getElementById('status').innerText = 'Logged in. OpenID: ' + s.identity +
        (s.secondary_identity ? ', UnionID: ' + s.secondary_identity : '');
    }} else {{
      setTimeout(poll, 2000);
    }}
  }}
  poll();
}})();
</script>
</body>
</html>
"#
    )
}

/// Interstitial shown in WeChat before starting the consent redirect.
pub(super) fn consent_page(base_path: &str, sid: &SessionId) -> String {
    let target = format!(
        "{base_path}/redirect-start?sid={}",
        urlencoding::encode(sid.as_str())
    );
    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1, viewport-fit=cover">
<title>Authorize login</title>
<style>
  body {{ margin: 0; min-height: 100vh; display: flex; align-items: center; justify-content: center;
         background: #1a1a1a; color: #fff; font-family: monospace; }}
  .card {{ width: 94%; max-width: 480px; padding: 24px; background: #2b2b2b; border: 4px solid #000; text-align: center; }}
  .badge {{ display: inline-block; margin: 12px 0 20px; padding: 8px 12px; background: #3a3a3a; border: 3px solid #000; }}
  .btn {{ display: block; margin: 0 auto; padding: 14px 24px; font-size: 18px; color: #000; background: #6cc24a;
         border: 4px solid #000; text-decoration: none; letter-spacing: 2px; }}
</style>
</head>
<body>
<div class="card">
  <h2>Authorize login</h2>
  <p>Open this page inside the WeChat app.</p>
  <div class="badge">Session: {sid}</div>
  <a id="go" class="btn" href="{target}">Authorize</a>
</div>
<script>
  document.getElementById('go').addEventListener('click', function (e) {{
    if (this.dataset.locked) {{ e.preventDefault(); return; }}
    this.dataset.locked = '1';
    this.innerText = 'Working...';
  }});
</script>
</body>
</html>
"#,
        sid = escape_html(sid.as_str()),
        target = escape_html(&target),
    )
}

/// Shown after a successful consent redirect.
pub(super) fn completion_page(profile: &Profile) -> String {
    let unionid = profile.unionid.as_ref().map_or("", |u| u.0.as_str());
    let greeting = profile
        .nickname
        .as_deref()
        .filter(|n| !n.is_empty())
        .map(|n| format!("<p>Welcome, {}</p>\n", escape_html(n)))
        .unwrap_or_default();
    format!(
        r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>Authorization complete</title></head>
<body>
<p>Authorization complete</p>
{greeting}<p>OpenID: {}</p>
<p>UnionID: {}</p>
</body>
</html>
"#,
        escape_html(&profile.openid.0),
        escape_html(unionid),
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OpenId, UnionId};

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn login_page_uses_base_path() {
        let html = login_page("/auth", true);
        assert!(html.contains(r#"data-base="/auth""#));
        assert!(html.contains(r#"id="wx-auth""#));
        assert!(!login_page("/auth", false).contains(r#"id="wx-auth""#));
    }

    #[test]
    fn consent_page_links_to_redirect_start() {
        let sid: SessionId = "abc-123".parse().unwrap();
        let html = consent_page("/login", &sid);
        assert!(html.contains(r#"href="/login/redirect-start?sid=abc-123""#));
        assert!(html.contains("Session: abc-123"));
    }

    #[test]
    fn completion_page_escapes_identities() {
        let profile = Profile::new(OpenId("o<1>".into())).with_unionid(UnionId("u&1".into()));
        let html = completion_page(&profile);
        assert!(html.contains("OpenID: o&lt;1&gt;"));
        assert!(html.contains("UnionID: u&amp;1"));
        assert!(!html.contains("Welcome"));
    }

    #[test]
    fn completion_page_greets_by_nickname() {
        let profile = Profile::new(OpenId("o1".into())).with_nickname("Mei <3");
        let html = completion_page(&profile);
        assert!(html.contains("<p>Welcome, Mei &lt;3</p>"));
        assert!(html.contains("UnionID: </p>"));
    }
}
