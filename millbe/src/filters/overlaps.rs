//! Overlap removal.
//!
//! The geometry lives behind [`OverlapRemover`] so a real boolean path
//! implementation can be plugged in through the
//! [`FilterRegistry`](crate::filters::FilterRegistry).

use std::{collections::BTreeSet, fmt::Debug, sync::Arc};

use log::warn;
use millcore::types::GlyphName;
use millir::font::{Font, Glyph};

use crate::{
    error::Error,
    filters::{layer_glyphs_mut, Filter},
};

pub trait OverlapRemover: Debug + Send + Sync {
    /// Merge overlapping contours in place, returning true if anything changed.
    fn remove_overlaps(&self, glyph: &mut Glyph) -> Result<bool, Error>;
}

/// Leaves outlines as they are
#[derive(Debug, Default)]
pub struct WarnOnlyOverlapRemover;

impl OverlapRemover for WarnOnlyOverlapRemover {
    fn remove_overlaps(&self, _: &mut Glyph) -> Result<bool, Error> {
        Ok(false)
    }
}

#[derive(Debug)]
pub struct RemoveOverlaps {
    remover: Arc<dyn OverlapRemover>,
}

impl RemoveOverlaps {
    pub fn new(remover: Arc<dyn OverlapRemover>) -> Self {
        RemoveOverlaps { remover }
    }
}

impl Filter for RemoveOverlaps {
    fn name(&self) -> &str {
        "removeOverlaps"
    }

    fn filter(
        &self,
        font: &mut Font,
        layer: Option<&str>,
        glyphs: &BTreeSet<GlyphName>,
    ) -> Result<usize, Error> {
        let set = layer_glyphs_mut(font, layer)?;
        let mut modified = 0;
        let mut candidates = 0;
        for name in glyphs {
            let Some(glyph) = set.get_mut(name) else {
                continue;
            };
            if glyph.contours.len() < 2 {
                continue;
            }
            candidates += 1;
            if self.remover.remove_overlaps(glyph)? {
                modified += 1;
            }
        }
        if candidates > 0 && modified == 0 {
            warn!(
                "{:?} left overlaps in place for {candidates} glyphs",
                self.remover
            );
        }
        Ok(modified)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::test_util::square;

    /// Keeps only the first contour
    #[derive(Debug)]
    struct KeepFirst;

    impl OverlapRemover for KeepFirst {
        fn remove_overlaps(&self, glyph: &mut Glyph) -> Result<bool, Error> {
            glyph.contours.truncate(1);
            Ok(true)
        }
    }

    fn font() -> Font {
        let mut font = Font::new();
        font.add_glyph(
            Glyph::new("o")
                .with_contour(square(0.0, 0.0, 100.0))
                .with_contour(square(50.0, 50.0, 100.0)),
        );
        font.add_glyph(Glyph::new("i").with_contour(square(0.0, 0.0, 10.0)));
        font
    }

    #[test]
    fn default_leaves_outlines_alone() {
        let mut font = font();
        let before = font.clone();
        let glyphs = font.glyphs.keys().cloned().collect();
        let modified = RemoveOverlaps::new(Arc::new(WarnOnlyOverlapRemover))
            .filter(&mut font, None, &glyphs)
            .unwrap();
        assert_eq!(0, modified);
        assert_eq!(before, font);
    }

    #[test]
    fn delegates_to_remover() {
        let mut font = font();
        let glyphs = font.glyphs.keys().cloned().collect();
        let modified = RemoveOverlaps::new(Arc::new(KeepFirst))
            .filter(&mut font, None, &glyphs)
            .unwrap();
        assert_eq!(1, modified);
        assert_eq!(1, font.glyphs["o"].contours.len());
    }
}
