//! Generates a [post](https://learn.microsoft.com/en-us/typography/opentype/spec/post) table.

use millcore::types::GlyphName;
use millir::font::FontInfo;
use write_fonts::{
    tables::post::Post,
    types::{FWord, Fixed},
    OtRound,
};

/// Where the underline goes absent fontinfo, as a share of the em
const UNDERLINE_POSITION: f64 = -0.075;
const UNDERLINE_THICKNESS: f64 = 0.05;

pub(crate) fn underline(info: &FontInfo) -> (f64, f64) {
    let upem = info.units_per_em();
    (
        info.get_f64("postscriptUnderlinePosition")
            .unwrap_or(upem * UNDERLINE_POSITION),
        info.get_f64("postscriptUnderlineThickness")
            .unwrap_or(upem * UNDERLINE_THICKNESS),
    )
}

/// A version 2 post, glyph names included
pub(crate) fn build_post(info: &FontInfo, glyph_order: &[GlyphName]) -> Post {
    let mut post = Post::new_v2(glyph_order.iter().map(|g| g.as_str()));
    let (position, thickness) = underline(info);
    post.italic_angle = Fixed::from_f64(info.get_f64("italicAngle").unwrap_or(0.0));
    post.underline_position = FWord::new(position.ot_round());
    post.underline_thickness = FWord::new(thickness.ot_round());
    let fixed_pitch = info
        .get("postscriptIsFixedPitch")
        .and_then(|v| v.as_boolean())
        .unwrap_or(false);
    post.is_fixed_pitch = fixed_pitch as u32;
    post
}
