use std::fmt::Write;

/// Incremental builder for one M3U8 tag line.
///
/// The first field added switches from the tag name to the value list;
/// subsequent fields are comma separated. The builder writes directly into
/// the caller's output string.
///
/// ```
/// use cueio::hls::Tag;
///
/// let mut line = String::new();
/// let mut tag = Tag::new("#EXT-X-KEY", &mut line);
/// tag.add_string("METHOD", "SAMPLE-AES");
/// tag.add_quoted_string("URI", "skd://key");
/// assert_eq!(line, "#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://key\"");
/// ```
pub struct Tag<'a> {
    out: &'a mut String,
    fields: usize,
}

impl<'a> Tag<'a> {
    /// Starts a tag with the given name.
    pub fn new(name: &str, out: &'a mut String) -> Self {
        out.push_str(name);
        Self { out, fields: 0 }
    }

    fn next_separator(&mut self) {
        self.out.push(if self.fields == 0 { ':' } else { ',' });
        self.fields += 1;
    }

    /// Adds `key=value` without quoting.
    pub fn add_string(&mut self, key: &str, value: &str) {
        self.next_separator();
        let _ = write!(self.out, "{}={}", key, value);
    }

    /// Adds `key="value"`.
    pub fn add_quoted_string(&mut self, key: &str, value: &str) {
        self.next_separator();
        let _ = write!(self.out, "{}=\"{}\"", key, value);
    }

    /// Adds `key=number`.
    pub fn add_number(&mut self, key: &str, value: u64) {
        self.next_separator();
        let _ = write!(self.out, "{}={}", key, value);
    }

    /// Adds a bare decimal value with millisecond precision.
    pub fn add_value(&mut self, value: f64) {
        self.next_separator();
        let _ = write!(self.out, "{:.3}", value);
    }

    /// Appends `/value` to the field written last, used for
    /// `position/duration` pairs.
    pub fn add_of_value(&mut self, value: f64) {
        let _ = write!(self.out, "/{:.3}", value);
    }

    /// Adds `key="first<separator>second"`, as in `BYTERANGE="500@0"`.
    pub fn add_quoted_number_pair(
        &mut self,
        key: &str,
        first: u64,
        separator: char,
        second: u64,
    ) {
        self.next_separator();
        let _ = write!(self.out, "{}=\"{}{}{}\"", key, first, separator, second);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_attribute_list() {
        let mut line = String::new();
        let mut tag = Tag::new("#EXT-X-KEY", &mut line);
        tag.add_string("METHOD", "SAMPLE-AES-CTR");
        tag.add_quoted_string("URI", "data:text/plain;base64,aaaa");
        tag.add_string("IV", "0x45454545");
        assert_eq!(
            line,
            "#EXT-X-KEY:METHOD=SAMPLE-AES-CTR,URI=\"data:text/plain;base64,aaaa\",IV=0x45454545"
        );
    }

    #[test]
    fn test_leading_value_and_of_value() {
        let mut line = String::new();
        let mut tag = Tag::new("#EXT-X-SIGNAL-SPAN", &mut line);
        tag.add_value(12.0);
        tag.add_of_value(30.0);
        tag.add_string("SpliceType", "LiveDAI");
        assert_eq!(line, "#EXT-X-SIGNAL-SPAN:12.000/30.000,SpliceType=LiveDAI");
    }

    #[test]
    fn test_quoted_number_pair() {
        let mut line = String::new();
        let mut tag = Tag::new("#EXT-X-MAP", &mut line);
        tag.add_quoted_string("URI", "media.mp4");
        tag.add_quoted_number_pair("BYTERANGE", 720, '@', 0);
        assert_eq!(line, "#EXT-X-MAP:URI=\"media.mp4\",BYTERANGE=\"720@0\"");
    }
}
