//! Generates a [name](https://learn.microsoft.com/en-us/typography/opentype/spec/name) table.
//!
//! All records are Windows Unicode BMP, US English.

use std::collections::BTreeMap;

use millir::font::FontInfo;
use write_fonts::{
    tables::name::{Name, NameRecord},
    types::NameId,
};

use crate::head::font_revision;

const WINDOWS: u16 = 3;
const UNICODE_BMP: u16 = 1;
const EN_US: u16 = 0x409;

/// The first id free for names specific to this font, such as axis names
const FIRST_FONT_SPECIFIC: u16 = 256;

const RIBBI: [&str; 4] = ["regular", "bold", "italic", "bold italic"];

/// What styleMapStyleName is, or would be if fontinfo has none
pub(crate) fn style_map_style_name(info: &FontInfo) -> String {
    if let Some(style) = info.get_str("styleMapStyleName") {
        return style.to_string();
    }
    let style = info.style_name().unwrap_or("Regular").to_lowercase();
    if RIBBI.contains(&style.as_str()) {
        style
    } else {
        "regular".to_string()
    }
}

/// What styleMapFamilyName is, or would be if fontinfo has none
pub(crate) fn style_map_family_name(info: &FontInfo) -> String {
    if let Some(family) = info.get_str("styleMapFamilyName") {
        return family.to_string();
    }
    let family = info.family_name().unwrap_or("New Font");
    let style = info.style_name().unwrap_or("Regular");
    if RIBBI.contains(&style.to_lowercase().as_str()) {
        family.to_string()
    } else {
        format!("{family} {style}")
    }
}

/// postscriptFontName, or Family-Style without spaces
pub(crate) fn postscript_name(info: &FontInfo) -> String {
    if let Some(name) = info.postscript_font_name() {
        return name.to_string();
    }
    let family = info.family_name().unwrap_or("New Font");
    let style = info.style_name().unwrap_or("Regular");
    format!("{family}-{style}")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn title_case(style: &str) -> String {
    style
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Name records by id, plus font specific names as they're requested
#[derive(Debug, Default)]
pub(crate) struct NameBuilder {
    names: BTreeMap<u16, String>,
}

impl NameBuilder {
    pub(crate) fn new(info: &FontInfo) -> NameBuilder {
        let mut names = BTreeMap::new();
        let mut set = |id: u16, value: Option<String>| {
            if let Some(value) = value.filter(|v| !v.is_empty()) {
                names.insert(id, value);
            }
        };
        let string = |key: &str| info.get_str(key).map(str::to_string);

        let family = info.family_name().unwrap_or("New Font").to_string();
        let style = info.style_name().unwrap_or("Regular").to_string();
        let style_map_family = style_map_family_name(info);
        let subfamily = title_case(&style_map_style_name(info));
        let postscript = postscript_name(info);
        let version = font_revision(info);
        let vendor = info.get_str("openTypeOS2VendorID").unwrap_or("NONE");

        set(0, string("copyright"));
        set(1, Some(style_map_family.clone()));
        set(2, Some(subfamily.clone()));
        set(
            3,
            string("openTypeNameUniqueID")
                .or_else(|| Some(format!("{version:.3};{vendor};{postscript}"))),
        );
        set(
            4,
            string("openTypeNameCompatibleFullName").or_else(|| Some(format!("{family} {style}"))),
        );
        set(
            5,
            string("openTypeNameVersion").or_else(|| Some(format!("Version {version:.3}"))),
        );
        set(6, Some(postscript));
        set(7, string("trademark"));
        set(8, string("openTypeNameManufacturer"));
        set(9, string("openTypeNameDesigner"));
        set(10, string("openTypeNameDescription"));
        set(11, string("openTypeNameManufacturerURL"));
        set(12, string("openTypeNameDesignerURL"));
        set(13, string("openTypeNameLicense"));
        set(14, string("openTypeNameLicenseURL"));

        // typographic names only when the style map ones don't already say it
        let typographic_family = string("openTypeNamePreferredFamilyName").unwrap_or(family);
        if typographic_family != style_map_family {
            set(16, Some(typographic_family));
        }
        let typographic_subfamily =
            string("openTypeNamePreferredSubfamilyName").unwrap_or(style);
        if typographic_subfamily != subfamily {
            set(17, Some(typographic_subfamily));
        }

        NameBuilder { names }
    }

    pub(crate) fn get(&self, id: u16) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// The id of a font specific name, reusing an existing one with the same text
    pub(crate) fn add_font_specific(&mut self, value: &str) -> NameId {
        if let Some((id, _)) = self
            .names
            .range(FIRST_FONT_SPECIFIC..)
            .find(|(_, existing)| existing.as_str() == value)
        {
            return NameId::new(*id);
        }
        let id = self
            .names
            .keys()
            .next_back()
            .map(|last| (*last + 1).max(FIRST_FONT_SPECIFIC))
            .unwrap_or(FIRST_FONT_SPECIFIC);
        self.names.insert(id, value.to_string());
        NameId::new(id)
    }

    pub(crate) fn build(&self) -> Name {
        Name::new(
            self.names
                .iter()
                .map(|(id, value)| {
                    NameRecord::new(
                        WINDOWS,
                        UNICODE_BMP,
                        EN_US,
                        NameId::new(*id),
                        value.clone().into(),
                    )
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn info(family: &str, style: &str) -> FontInfo {
        let mut info = FontInfo::default();
        info.set("familyName", plist::Value::String(family.into()));
        info.set("styleName", plist::Value::String(style.into()));
        info.set("versionMajor", plist::Value::Integer(1.into()));
        info.set("versionMinor", plist::Value::Integer(2.into()));
        info
    }

    #[rstest]
    #[case::regular("Regular", "Test", "Regular", None, None)]
    #[case::bold_italic("Bold Italic", "Test", "Bold Italic", None, None)]
    #[case::light("Light", "Test Light", "Regular", Some("Test"), Some("Light"))]
    fn style_linking(
        #[case] style: &str,
        #[case] name1: &str,
        #[case] name2: &str,
        #[case] name16: Option<&str>,
        #[case] name17: Option<&str>,
    ) {
        let names = NameBuilder::new(&info("Test", style));
        assert_eq!(
            (Some(name1), Some(name2), name16, name17),
            (names.get(1), names.get(2), names.get(16), names.get(17))
        );
    }

    #[test]
    fn derived_names() {
        let names = NameBuilder::new(&info("Test Sans", "Semi Bold"));
        assert_eq!(Some("Test Sans Semi Bold"), names.get(4));
        assert_eq!(Some("Version 1.002"), names.get(5));
        assert_eq!(Some("TestSans-SemiBold"), names.get(6));
        assert_eq!(Some("1.002;NONE;TestSans-SemiBold"), names.get(3));
        assert_eq!(None, names.get(0));
    }

    #[test]
    fn font_specific_names_are_shared() {
        let mut names = NameBuilder::new(&info("Test", "Regular"));
        let weight = names.add_font_specific("Weight");
        let width = names.add_font_specific("Width");
        assert_eq!(NameId::new(256), weight);
        assert_eq!(NameId::new(257), width);
        assert_eq!(weight, names.add_font_specific("Weight"));
        // well known names are not reused
        assert_eq!(NameId::new(258), names.add_font_specific("Regular"));
    }

    #[test]
    fn builds_windows_records() {
        let name = NameBuilder::new(&info("Test", "Regular")).build();
        assert!(name
            .name_record
            .iter()
            .all(|r| r.platform_id == WINDOWS && r.language_id == EN_US));
    }
}
