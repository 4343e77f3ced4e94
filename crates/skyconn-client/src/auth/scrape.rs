//! Field scraping for the HTML login pages.
//!
//! The pages embed the values we need in hidden inputs and inline script, so
//! these helpers match them with targeted regexes instead of parsing HTML.

use once_cell::sync::Lazy;
use regex::Regex;

static INPUT_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<input\b[^>]*>").expect("INPUT_TAG_REGEX should compile"));

static FORM_TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<form\b[^>]*>").expect("FORM_TAG_REGEX should compile"));

static ATTRIBUTE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
        .expect("ATTRIBUTE_REGEX should compile")
});

static PPFT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<input.*?name="PPFT".*?value="(.*?)""#).expect("PPFT_REGEX should compile")
});

static OPID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)opid=([A-Z0-9]+)").expect("OPID_REGEX should compile"));

static ERROR_TEXT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"sErrTxt:'([^'\\]*(?:\\.[^'\\]*)*)'").expect("ERROR_TEXT_REGEX should compile")
});

static TAG_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<.*?>").expect("TAG_REGEX should compile"));

static TWO_FACTOR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bV:\s*\[\s*\{").expect("TWO_FACTOR_REGEX should compile"));

/// Value of an attribute inside a single tag.
fn attribute<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    ATTRIBUTE_REGEX
        .captures_iter(tag)
        .find(|c| c[1].eq_ignore_ascii_case(name))
        .and_then(|c| c.get(2).or_else(|| c.get(3)))
        .map(|m| m.as_str())
}

/// Value of the `<input>` whose `attr` equals `wanted`.
fn input_value(html: &str, attr: &str, wanted: &str) -> Option<String> {
    INPUT_TAG_REGEX
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|tag| attribute(tag, attr) == Some(wanted))
        .and_then(|tag| attribute(tag, "value"))
        .map(decode_entities)
}

/// Value of the `<input id="...">` element.
pub(crate) fn input_by_id(html: &str, id: &str) -> Option<String> {
    input_value(html, "id", id)
}

/// Value of the `<input name="...">` element.
pub(crate) fn input_by_name(html: &str, name: &str) -> Option<String> {
    input_value(html, "name", name)
}

/// The anti-forgery `PPFT` value, which sits inside inline script.
pub(crate) fn ppft(html: &str) -> Option<String> {
    PPFT_REGEX.captures(html).map(|c| c[1].to_string())
}

/// The `opid` continuation value.
pub(crate) fn opid(html: &str) -> Option<String> {
    OPID_REGEX.captures(html).map(|c| c[1].to_string())
}

/// Inline error text (`sErrTxt:'...'`), unescaped and with markup removed.
pub(crate) fn inline_error(html: &str) -> Option<String> {
    let raw = ERROR_TEXT_REGEX.captures(html)?.get(1)?.as_str();
    let text = TAG_REGEX
        .replace_all(raw, "")
        .replace("\\'", "'")
        .replace("\\\\", "\\");
    Some(text)
}

/// Whether the page lists second-factor devices.
pub(crate) fn has_two_factor_prompt(html: &str) -> bool {
    TWO_FACTOR_REGEX.is_match(html)
}

/// Action URL (without query) of the account consent form, if present.
pub(crate) fn consent_form_action(html: &str) -> Option<String> {
    FORM_TAG_REGEX
        .find_iter(html)
        .map(|m| m.as_str())
        .find(|tag| attribute(tag, "name") == Some("fmHF"))
        .map(|tag| {
            let action = attribute(tag, "action").unwrap_or_default();
            action.split('?').next().unwrap_or_default().to_string()
        })
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inputs_by_id_and_name() {
        let html = r#"<form><input type="hidden" name="t" id="t" value="EwB4Aq1&amp;DAAU"/>
            <input type="hidden" value="skype-token-value" name="skypetoken">
            <input type="hidden" name="expires_in" value="86400"></form>"#;
        assert_eq!(input_by_id(html, "t").as_deref(), Some("EwB4Aq1&DAAU"));
        assert_eq!(input_by_name(html, "skypetoken").as_deref(), Some("skype-token-value"));
        assert_eq!(input_by_name(html, "expires_in").as_deref(), Some("86400"));
        assert_eq!(input_by_id(html, "missing"), None);
    }

    #[test]
    fn ppft_inside_script() {
        let html = r#"var ServerData = {sFTTag:'<input type="hidden" name="PPFT" id="i0327" value="DfT8!Xy*Zz$"/>'};"#;
        assert_eq!(ppft(html).as_deref(), Some("DfT8!Xy*Zz$"));
    }

    #[test]
    fn opid_is_case_insensitive() {
        assert_eq!(
            opid("urlPost:'https://login.live.com/ppsecure/post.srf?OPID=AB12CD&x=1'").as_deref(),
            Some("AB12CD")
        );
    }

    #[test]
    fn inline_error_is_cleaned() {
        let html = r#"sErrTxt:'Your account or password is incorrect. <a href=\"x\">Reset it</a> if you don\'t remember',"#;
        assert_eq!(
            inline_error(html).as_deref(),
            Some("Your account or password is incorrect. Reset it if you don't remember")
        );
    }

    #[test]
    fn two_factor_and_consent_markers() {
        assert!(has_two_factor_prompt("{A:1, V: [ {type: 'sms'} ]}"));
        assert!(!has_two_factor_prompt("{V: []}"));
        let html = r#"<form name="fmHF" id="fmHF" action="https://account.live.com/tou/accrue?mkt=en" method="post">"#;
        assert_eq!(
            consent_form_action(html).as_deref(),
            Some("https://account.live.com/tou/accrue")
        );
        assert_eq!(consent_form_action("<form name=\"other\">"), None);
    }
}
