//! Generates a [maxp](https://learn.microsoft.com/en-us/typography/opentype/spec/maxp) table.

use write_fonts::tables::maxp::Maxp;

use crate::{error::Error, hmetrics::FontLimits};

/// A version 1.0 maxp, as TrueType outlines need
pub(crate) fn build_maxp(num_glyphs: usize, limits: &mut FontLimits) -> Result<Maxp, Error> {
    let num_glyphs = num_glyphs.try_into().map_err(|_| Error::Table {
        table: "maxp".to_string(),
        reason: format!("{num_glyphs} glyphs is too many"),
    })?;
    let composite_limits = limits.composite_limits();
    Ok(Maxp {
        num_glyphs,
        // maxp computes it's version based on whether fields are set
        // if you fail to set any of them it gets angry with you so set all of them
        max_points: Some(limits.max_points),
        max_contours: Some(limits.max_contours),
        max_composite_points: Some(composite_limits.max_points),
        max_composite_contours: Some(composite_limits.max_contours),
        max_zones: Some(1),
        max_twilight_points: Some(0),
        max_storage: Some(0),
        max_function_defs: Some(0),
        max_instruction_defs: Some(0),
        max_stack_elements: Some(0),
        max_size_of_instructions: Some(0),
        max_component_elements: Some(limits.max_component_elements),
        max_component_depth: Some(composite_limits.max_depth),
    })
}
