//! XML property list output
//!
//! Responses (`/server-info`, `/playback-info`, `/setProperty` results)
//! and the FCUP request bodies go out as XML plists, the same form the
//! reference servers produce with libplist's `plist_to_xml`.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::PlistValue;

const HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
<!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
<plist version=\"1.0\">\n";

/// Render a [`PlistValue`] as an XML property list document
#[must_use]
pub fn encode_xml(value: &PlistValue) -> String {
    let mut out = String::with_capacity(256);
    out.push_str(HEADER);
    write_value(&mut out, value, 0);
    out.push_str("</plist>\n");
    out
}

fn write_value(out: &mut String, value: &PlistValue, depth: usize) {
    let pad = "\t".repeat(depth);
    match value {
        PlistValue::Boolean(true) => out.push_str(&format!("{pad}<true/>\n")),
        PlistValue::Boolean(false) => out.push_str(&format!("{pad}<false/>\n")),
        PlistValue::Integer(i) => out.push_str(&format!("{pad}<integer>{i}</integer>\n")),
        PlistValue::Real(f) => out.push_str(&format!("{pad}<real>{f:?}</real>\n")),
        PlistValue::String(s) => {
            out.push_str(&format!("{pad}<string>{}</string>\n", escape(s)));
        }
        PlistValue::Data(d) => {
            out.push_str(&format!("{pad}<data>{}</data>\n", BASE64.encode(d)));
        }
        PlistValue::Array(items) => {
            if items.is_empty() {
                out.push_str(&format!("{pad}<array/>\n"));
                return;
            }
            out.push_str(&format!("{pad}<array>\n"));
            for item in items {
                write_value(out, item, depth + 1);
            }
            out.push_str(&format!("{pad}</array>\n"));
        }
        PlistValue::Dictionary(dict) => {
            if dict.is_empty() {
                out.push_str(&format!("{pad}<dict/>\n"));
                return;
            }
            let mut keys: Vec<&String> = dict.keys().collect();
            keys.sort();

            out.push_str(&format!("{pad}<dict>\n"));
            for key in keys {
                out.push_str(&format!("{pad}\t<key>{}</key>\n", escape(key)));
                write_value(out, &dict[key], depth + 1);
            }
            out.push_str(&format!("{pad}</dict>\n"));
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::super::DictBuilder;
    use super::*;

    #[test]
    fn test_server_info_shape() {
        let plist = DictBuilder::new()
            .insert("features", 0x27Fi64)
            .insert("macAddress", "AA:BB:CC:DD:EE:FF")
            .insert("protovers", "1.0")
            .build();

        let xml = encode_xml(&plist);
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<key>features</key>"));
        assert!(xml.contains("<integer>639</integer>"));
        assert!(xml.contains("<string>AA:BB:CC:DD:EE:FF</string>"));
        assert!(xml.ends_with("</plist>\n"));
    }

    #[test]
    fn test_real_and_bool_rendering() {
        let plist = DictBuilder::new()
            .insert("position", 12.5)
            .insert("duration", 60.0)
            .insert("readyToPlay", true)
            .build();

        let xml = encode_xml(&plist);
        assert!(xml.contains("<real>12.5</real>"));
        assert!(xml.contains("<real>60.0</real>"));
        assert!(xml.contains("<true/>"));
    }

    #[test]
    fn test_nested_array_of_ranges() {
        let range = DictBuilder::new()
            .insert("start", 10.0)
            .insert("duration", 50.0)
            .build();
        let plist = DictBuilder::new()
            .insert("loadedTimeRanges", PlistValue::Array(vec![range]))
            .build();

        let xml = encode_xml(&plist);
        assert!(xml.contains("<array>"));
        assert!(xml.contains("<key>start</key>"));
        assert!(xml.contains("<real>10.0</real>"));
    }

    #[test]
    fn test_escaping() {
        let plist = DictBuilder::new().insert("s", "a<b&c>d").build();
        let xml = encode_xml(&plist);
        assert!(xml.contains("<string>a&lt;b&amp;c&gt;d</string>"));
    }

    #[test]
    fn test_data_base64() {
        let plist = DictBuilder::new()
            .insert("blob", PlistValue::Data(vec![0xDE, 0xAD, 0xBE, 0xEF]))
            .build();
        let xml = encode_xml(&plist);
        assert!(xml.contains("<data>3q2+7w==</data>"));
    }
}
