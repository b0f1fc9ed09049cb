//! SSML document building.

use shorts_models::ProsodyPreset;

/// Escape the five XML special characters.
pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Wrap `text` in a `<speak>` document with one voice and one prosody element.
pub fn build_ssml(text: &str, voice: &str, locale: &str, prosody: &ProsodyPreset) -> String {
    format!(
        "<speak version=\"1.0\" xmlns=\"http://www.w3.org/2001/10/synthesis\" xml:lang=\"{locale}\">\
         <voice name=\"{voice}\">\
         <prosody rate=\"{rate}\" pitch=\"{pitch}\" volume=\"{volume}\">{text}</prosody>\
         </voice></speak>",
        locale = escape_xml(locale),
        voice = escape_xml(voice),
        rate = prosody.rate(),
        pitch = prosody.pitch(),
        volume = prosody.volume(),
        text = escape_xml(text.trim()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use shorts_models::EmotionTag;

    #[test]
    fn test_build_ssml_carries_prosody() {
        let ssml = build_ssml(
            "Tom & Jerry <live>",
            "ko-KR-SunHiNeural",
            "ko-KR",
            &EmotionTag::Excited.prosody(),
        );
        assert!(ssml.starts_with("<speak version=\"1.0\""));
        assert!(ssml.contains("xml:lang=\"ko-KR\""));
        assert!(ssml.contains("<voice name=\"ko-KR-SunHiNeural\">"));
        assert!(ssml.contains("rate=\"+15%\" pitch=\"+8Hz\" volume=\"+10%\""));
        assert!(ssml.contains(">Tom &amp; Jerry &lt;live&gt;</prosody>"));
    }

    #[test]
    fn test_negative_prosody() {
        let ssml = build_ssml("calm", "v", "ko-KR", &EmotionTag::Calm.prosody());
        assert!(ssml.contains("rate=\"-10%\" pitch=\"-2Hz\" volume=\"-5%\""));
    }
}
