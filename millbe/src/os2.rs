//! Generates a [OS/2](https://learn.microsoft.com/en-us/typography/opentype/spec/os2) table.

use std::collections::BTreeMap;

use log::warn;
use millir::font::FontInfo;
use write_fonts::{
    tables::os2::{Os2, SelectionFlags},
    types::Tag,
    OtRound,
};

use crate::{
    font::info_bits,
    hmetrics::VerticalMetrics,
    name::style_map_style_name,
    post::underline,
};

/// Unicode blocks and the OS/2 range bit each sets.
///
/// <https://learn.microsoft.com/en-us/typography/opentype/spec/os2#ur>
const UNICODE_RANGES: &[(u32, u32, u32)] = &[
    (0x0000, 0x007F, 0),
    (0x0080, 0x00FF, 1),
    (0x0100, 0x017F, 2),
    (0x0180, 0x024F, 3),
    (0x0250, 0x02AF, 4),
    (0x1D00, 0x1DBF, 4),
    (0x02B0, 0x02FF, 5),
    (0x0300, 0x036F, 6),
    (0x0370, 0x03FF, 7),
    (0x2C80, 0x2CFF, 8),
    (0x0400, 0x052F, 9),
    (0x0530, 0x058F, 10),
    (0x0590, 0x05FF, 11),
    (0x0600, 0x06FF, 13),
    (0x0900, 0x097F, 15),
    (0x0980, 0x09FF, 16),
    (0x0E00, 0x0E7F, 24),
    (0x10A0, 0x10FF, 26),
    (0x1E00, 0x1EFF, 29),
    (0x1F00, 0x1FFF, 30),
    (0x2000, 0x206F, 31),
    (0x2070, 0x209F, 32),
    (0x20A0, 0x20CF, 33),
    (0x20D0, 0x20FF, 34),
    (0x2100, 0x214F, 35),
    (0x2150, 0x218F, 36),
    (0x2190, 0x21FF, 37),
    (0x2200, 0x22FF, 38),
    (0x2300, 0x23FF, 39),
    (0x2500, 0x257F, 43),
    (0x2580, 0x259F, 44),
    (0x25A0, 0x25FF, 45),
    (0x2600, 0x26FF, 46),
    (0x2700, 0x27BF, 47),
    (0x3000, 0x303F, 48),
    (0x3040, 0x309F, 49),
    (0x30A0, 0x30FF, 50),
    (0x4E00, 0x9FFF, 59),
    (0xE000, 0xF8FF, 60),
    (0xFB00, 0xFB4F, 62),
    (0xFE20, 0xFE2F, 64),
    (0xFFF0, 0xFFFF, 69),
];

/// Bit 57 marks anything beyond the BMP
const NON_PLANE_0: u32 = 57;

fn unicode_range_bits(chars: impl Iterator<Item = char>) -> [u32; 4] {
    let mut ranges = [0u32; 4];
    let mut set = |bit: u32| ranges[(bit / 32) as usize] |= 1 << (bit % 32);
    for c in chars {
        let c = c as u32;
        if c > 0xFFFF {
            set(NON_PLANE_0);
            continue;
        }
        for (start, end, bit) in UNICODE_RANGES {
            if (*start..=*end).contains(&c) {
                set(*bit);
            }
        }
    }
    ranges
}

fn split_bits(bits: u128) -> [u32; 4] {
    [
        bits as u32,
        (bits >> 32) as u32,
        (bits >> 64) as u32,
        (bits >> 96) as u32,
    ]
}

fn vendor_id(info: &FontInfo) -> Tag {
    let vendor = info.get_str("openTypeOS2VendorID").unwrap_or("NONE");
    // short ids are padded with spaces
    let padded = format!("{vendor:<4}");
    match Tag::new_checked(padded.as_bytes()) {
        Ok(tag) => tag,
        Err(e) => {
            warn!("Ignoring openTypeOS2VendorID {vendor:?}: {e}");
            Tag::new(b"NONE")
        }
    }
}

fn selection_flags(info: &FontInfo) -> SelectionFlags {
    // only bits 7, 8 and 9 may be set explicitly, the rest follow the style
    let explicit = info_bits(info, "openTypeOS2Selection").unwrap_or(0) & 0b11_1000_0000;
    let mut flags = SelectionFlags::from_bits_truncate(explicit as u16);
    let style = style_map_style_name(info);
    if style.contains("italic") {
        flags |= SelectionFlags::ITALIC;
    }
    if style.contains("bold") {
        flags |= SelectionFlags::BOLD;
    }
    if style == "regular" {
        flags |= SelectionFlags::REGULAR;
    }
    flags
}

/// Average of the non-zero advances, as fontTools computes it
///
/// <https://github.com/fonttools/fonttools/blob/115275cbf429d91b75ac5536f5f0b2d6fe9d823a/Lib/fontTools/ttLib/tables/O_S_2f_2.py#L336-L348>
fn x_avg_char_width(advances: &[f64]) -> i16 {
    let (count, total) = advances
        .iter()
        .map(|advance| -> u16 { advance.max(0.0).ot_round() })
        .filter(|advance| *advance > 0)
        .fold((0_u64, 0_u64), |(count, total), value| {
            (count + 1, total + value as u64)
        });
    if count == 0 {
        return 0;
    }
    (total as f64 / count as f64).ot_round()
}

fn info_or(info: &FontInfo, key: &str, default: f64) -> f64 {
    info.get_f64(key).unwrap_or(default)
}

/// A version 4 OS/2
pub(crate) fn build_os2(
    info: &FontInfo,
    advances: &[f64],
    cmap: &BTreeMap<char, u32>,
    max_context: u16,
) -> Os2 {
    let upem = info.units_per_em();
    let metrics = VerticalMetrics::new(info);
    let (_, underline_thickness) = underline(info);
    let italic_angle = info_or(info, "italicAngle", 0.0);

    let unicode_ranges = match info_bits(info, "openTypeOS2UnicodeRanges") {
        Some(bits) => split_bits(bits),
        None => unicode_range_bits(cmap.keys().copied()),
    };
    let code_pages = split_bits(info_bits(info, "openTypeOS2CodePageRanges").unwrap_or(1));

    // subscripts and superscripts lean with the italic angle
    let sub_y_offset = info_or(info, "openTypeOS2SubscriptYOffset", upem * 0.075);
    let sup_y_offset = info_or(info, "openTypeOS2SuperscriptYOffset", upem * 0.35);
    let slant = (-italic_angle).to_radians().tan();

    let first_char = cmap.keys().next().map(|c| *c as u32).unwrap_or_default();
    let last_char = cmap.keys().next_back().map(|c| *c as u32).unwrap_or_default();

    let mut panose = [0u8; 10];
    if let Some(values) = info.get("openTypeOS2Panose").and_then(|v| v.as_array()) {
        for (slot, value) in panose.iter_mut().zip(values.iter()) {
            *slot = value
                .as_signed_integer()
                .and_then(|v| u8::try_from(v).ok())
                .unwrap_or_default();
        }
    }

    Os2 {
        x_avg_char_width: x_avg_char_width(advances),
        us_weight_class: info_or(info, "openTypeOS2WeightClass", 400.0).ot_round(),
        us_width_class: info_or(info, "openTypeOS2WidthClass", 5.0).ot_round(),
        fs_type: info_bits(info, "openTypeOS2Type").unwrap_or(1 << 2) as u16,

        y_subscript_x_size: info_or(info, "openTypeOS2SubscriptXSize", upem * 0.65).ot_round(),
        y_subscript_y_size: info_or(info, "openTypeOS2SubscriptYSize", upem * 0.6).ot_round(),
        y_subscript_x_offset: info_or(info, "openTypeOS2SubscriptXOffset", -sub_y_offset * slant)
            .ot_round(),
        y_subscript_y_offset: sub_y_offset.ot_round(),
        y_superscript_x_size: info_or(info, "openTypeOS2SuperscriptXSize", upem * 0.65)
            .ot_round(),
        y_superscript_y_size: info_or(info, "openTypeOS2SuperscriptYSize", upem * 0.6).ot_round(),
        y_superscript_x_offset: info_or(
            info,
            "openTypeOS2SuperscriptXOffset",
            sup_y_offset * slant,
        )
        .ot_round(),
        y_superscript_y_offset: sup_y_offset.ot_round(),
        y_strikeout_size: info_or(info, "openTypeOS2StrikeoutSize", underline_thickness)
            .ot_round(),
        y_strikeout_position: info_or(
            info,
            "openTypeOS2StrikeoutPosition",
            metrics.x_height * 0.6,
        )
        .ot_round(),

        s_family_class: info_or(info, "openTypeOS2FamilyClass", 0.0).ot_round(),
        panose_10: panose,
        ul_unicode_range_1: unicode_ranges[0],
        ul_unicode_range_2: unicode_ranges[1],
        ul_unicode_range_3: unicode_ranges[2],
        ul_unicode_range_4: unicode_ranges[3],
        ach_vend_id: vendor_id(info),
        fs_selection: selection_flags(info),
        us_first_char_index: first_char.min(0xFFFF) as u16,
        us_last_char_index: last_char.min(0xFFFF) as u16,

        s_typo_ascender: metrics.ascender.ot_round(),
        s_typo_descender: metrics.descender.ot_round(),
        s_typo_line_gap: metrics.typo_line_gap.ot_round(),
        us_win_ascent: info_or(info, "openTypeOS2WinAscent", metrics.hhea_ascender.max(0.0))
            .ot_round(),
        us_win_descent: info_or(
            info,
            "openTypeOS2WinDescent",
            (-metrics.hhea_descender).max(0.0),
        )
        .ot_round(),

        // Avoid "field must be present for version 2" caused by default to None
        ul_code_page_range_1: Some(code_pages[0]),
        ul_code_page_range_2: Some(code_pages[1]),
        sx_height: Some(metrics.x_height.ot_round()),
        s_cap_height: Some(metrics.cap_height.ot_round()),
        us_default_char: Some(0),
        us_break_char: Some(0x20),
        us_max_context: Some(max_context),

        ..Default::default()
    }
}
