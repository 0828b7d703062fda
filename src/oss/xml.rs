use regex::Regex;

fn element(tag: &str) -> Option<Regex> {
    Regex::new(&format!(r"(?s)<{0}>(.*?)</{0}>", regex::escape(tag))).ok()
}

pub fn tag_text(xml: &str, tag: &str) -> Option<String> {
    element(tag)?
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| unescape(m.as_str().trim()))
}

pub fn blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let Some(re) = element(tag) else {
        return Vec::new();
    };
    re.captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .collect()
}

pub fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// `Code: Message` from an OSS error document, if it is one.
pub fn error_summary(xml: &str) -> Option<String> {
    let code = tag_text(xml, "Code")?;
    match tag_text(xml, "Message") {
        Some(message) => Some(format!("{}: {}", code, message)),
        None => Some(code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIST: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult>
  <Name>media</Name>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>tok&amp;1</NextContinuationToken>
  <Contents>
    <Key>uploads/a.aac</Key>
    <Size>100</Size>
  </Contents>
  <Contents>
    <Key>uploads/b &amp; c.aac</Key>
    <Size>200</Size>
  </Contents>
</ListBucketResult>"#;

    #[test]
    fn test_tag_text_and_blocks() {
        assert_eq!(tag_text(LIST, "IsTruncated").as_deref(), Some("true"));
        assert_eq!(tag_text(LIST, "NextContinuationToken").as_deref(), Some("tok&1"));
        assert_eq!(tag_text(LIST, "Missing"), None);

        let contents = blocks(LIST, "Contents");
        assert_eq!(contents.len(), 2);
        assert_eq!(tag_text(contents[1], "Key").as_deref(), Some("uploads/b & c.aac"));
        assert_eq!(tag_text(contents[1], "Size").as_deref(), Some("200"));
    }

    #[test]
    fn test_error_summary() {
        let body = "<Error><Code>NoSuchKey</Code><Message>The specified key does not exist.</Message></Error>";
        assert_eq!(
            error_summary(body).as_deref(),
            Some("NoSuchKey: The specified key does not exist.")
        );
        assert_eq!(error_summary("not xml"), None);
    }

    #[test]
    fn test_escape_unescape() {
        let raw = r#"a<b>&"c'"#;
        assert_eq!(unescape(&escape(raw)), raw);
        assert_eq!(escape("x&y"), "x&amp;y");
    }
}
