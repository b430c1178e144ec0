//! # Diagnostic Names
//!
//! Map DWARF enumerants to their mnemonic names for trace output and the CLI.
//!
//! The tables themselves come from `gimli::constants`, which is generated from
//! the DWARF standard. Unknown values map to [`UNKNOWN`] instead of failing.

use std::fmt;
use std::str::FromStr;

use gimli::constants::{DwAt, DwForm, DwInl, DwLang, DwLnct, DwLne, DwLns, DwTag, DwUt};

/// Placeholder returned for values without a known name.
pub const UNKNOWN: &str = "<unknown>";

/// Name of an attribute (`DW_AT_*`).
#[must_use]
pub fn string_for_at(value: DwAt) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Name of an attribute form (`DW_FORM_*`).
#[must_use]
pub fn string_for_form(value: DwForm) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Name of a DIE tag (`DW_TAG_*`).
#[must_use]
pub fn string_for_tag(value: DwTag) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Name of a standard line-number opcode (`DW_LNS_*`).
#[must_use]
pub fn string_for_lns(value: DwLns) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Name of an extended line-number opcode (`DW_LNE_*`).
#[must_use]
pub fn string_for_lne(value: DwLne) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Name of a line-table content type code (`DW_LNCT_*`).
#[must_use]
pub fn string_for_lnct(value: DwLnct) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Name of an inline state (`DW_INL_*`).
#[must_use]
pub fn string_for_inline_state(value: DwInl) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Name of a unit type (`DW_UT_*`).
#[must_use]
pub fn string_for_unit_type(value: DwUt) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Name of a source language (`DW_LANG_*`).
#[must_use]
pub fn string_for_language(value: DwLang) -> &'static str
{
    value.static_string().unwrap_or(UNKNOWN)
}

/// Which enumeration a raw value belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind
{
    At,
    Form,
    Tag,
    Lns,
    Lne,
    Lnct,
    Inl,
    Ut,
    Lang,
}

impl NameKind
{
    /// Look up `value` in this enumeration.
    ///
    /// Values too wide for the enumeration's code type are unknown.
    #[must_use]
    pub fn lookup(self, value: u64) -> &'static str
    {
        match self {
            NameKind::At => u16::try_from(value).map_or(UNKNOWN, |v| string_for_at(DwAt(v))),
            NameKind::Form => u16::try_from(value).map_or(UNKNOWN, |v| string_for_form(DwForm(v))),
            NameKind::Tag => u16::try_from(value).map_or(UNKNOWN, |v| string_for_tag(DwTag(v))),
            NameKind::Lns => u8::try_from(value).map_or(UNKNOWN, |v| string_for_lns(DwLns(v))),
            NameKind::Lne => u8::try_from(value).map_or(UNKNOWN, |v| string_for_lne(DwLne(v))),
            NameKind::Lnct => u16::try_from(value).map_or(UNKNOWN, |v| string_for_lnct(DwLnct(v))),
            NameKind::Inl => u8::try_from(value).map_or(UNKNOWN, |v| string_for_inline_state(DwInl(v))),
            NameKind::Ut => u8::try_from(value).map_or(UNKNOWN, |v| string_for_unit_type(DwUt(v))),
            NameKind::Lang => u16::try_from(value).map_or(UNKNOWN, |v| string_for_language(DwLang(v))),
        }
    }
}

impl FromStr for NameKind
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "at" | "attr" | "attribute" => Ok(NameKind::At),
            "form" => Ok(NameKind::Form),
            "tag" => Ok(NameKind::Tag),
            "lns" => Ok(NameKind::Lns),
            "lne" => Ok(NameKind::Lne),
            "lnct" => Ok(NameKind::Lnct),
            "inl" | "inline" => Ok(NameKind::Inl),
            "ut" | "unit" => Ok(NameKind::Ut),
            "lang" | "language" => Ok(NameKind::Lang),
            _ => Err(format!(
                "Unknown name kind: {s}. Use at, form, tag, lns, lne, lnct, inl, ut or lang"
            )),
        }
    }
}

impl fmt::Display for NameKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let label = match self {
            NameKind::At => "at",
            NameKind::Form => "form",
            NameKind::Tag => "tag",
            NameKind::Lns => "lns",
            NameKind::Lne => "lne",
            NameKind::Lnct => "lnct",
            NameKind::Inl => "inl",
            NameKind::Ut => "ut",
            NameKind::Lang => "lang",
        };
        write!(f, "{label}")
    }
}
