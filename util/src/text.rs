pub trait StrExt {
    /// Convert identifiers to lowercase kebab-case. Adds hyphens between
    /// connected lowercase and uppercase characters for CamelCase
    /// identifiers.
    fn to_kebab_case(&self) -> String;

    /// Parse an unsigned integer literal, either decimal or `0x` prefixed
    /// hexadecimal.
    fn parse_int_literal(&self) -> Option<u64>;
}

impl StrExt for str {
    fn to_kebab_case(&self) -> String {
        let mut result = String::with_capacity(self.len());
        let mut prev = '_';
        for c in self.chars() {
            match c {
                '_' => result.push('-'),
                c if c.is_uppercase() && prev.is_lowercase() => {
                    result.push('-');
                    result.push(c.to_ascii_lowercase());
                }
                c => result.push(c.to_ascii_lowercase()),
            }
            prev = c;
        }

        result
    }

    fn parse_int_literal(&self) -> Option<u64> {
        let s = self.trim();
        if let Some(hex) =
            s.strip_prefix("0x").or_else(|| s.strip_prefix("0X"))
        {
            u64::from_str_radix(hex, 16).ok()
        } else {
            s.parse().ok()
        }
    }
}
