extern crate proc_macro;
use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, DeriveInput};

/// Serde support for `bitflags` types.
///
/// Flags are written as a list of kebab-case flag names, `-` when no flag is
/// set. Reading also accepts a single integer literal (`12`, `0x0c`) that is
/// taken as the raw bits, unknown bits dropped.
///
/// The deriving crate must have `serde`, `bitflags` and `util` available.
#[proc_macro_derive(KebabFlags)]
pub fn derive_kebab_flags(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    let name = &ast.ident;
    let gen = quote! {
        impl serde::Serialize for #name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                use util::StrExt;

                if self.is_empty() {
                    return "-".serialize(serializer);
                }

                self.iter_names()
                    .map(|(s, _)| s.to_kebab_case())
                    .collect::<Vec<_>>()
                    .serialize(serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for #name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::de::Deserializer<'de>,
            {
                use util::StrExt;

                let words = <Vec<String>>::deserialize(deserializer)?;

                if let [word] = &words[..] {
                    if word == "-" {
                        return Ok(#name::empty());
                    }
                    if let Some(n) = word.parse_int_literal() {
                        let bits = n.try_into().map_err(|_| {
                            serde::de::Error::custom(format!(
                                "flag value {word} out of range"
                            ))
                        })?;
                        return Ok(#name::from_bits_truncate(bits));
                    }
                }

                let mut ret = #name::empty();
                for word in words {
                    let flag = <#name as bitflags::Flags>::FLAGS
                        .iter()
                        .find(|f| f.name().to_kebab_case() == word)
                        .ok_or_else(|| {
                            serde::de::Error::custom(format!(
                                "unknown flag {word}"
                            ))
                        })?;
                    ret |= *flag.value();
                }

                Ok(ret)
            }
        }

        impl std::fmt::Display for #name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                use util::StrExt;

                if self.is_empty() {
                    return write!(f, "-");
                }

                for (i, (s, _)) in self.iter_names().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", s.to_kebab_case())?;
                }
                Ok(())
            }
        }
    };
    gen.into()
}
