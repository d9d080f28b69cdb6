//! Basic types useful for building fonts from designspaces.

use std::{
    collections::HashMap,
    fmt::{Debug, Display},
};

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

pub use write_fonts::types::Tag;

use crate::{
    coords::{
        CoordConverter, DesignCoord, DesignLocation, NormalizedCoord, NormalizedLocation,
        UserCoord, UserLocation,
    },
    piecewise_linear_map::OutOfRange,
    Error,
};

#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GlyphName(SmolStr);

impl GlyphName {
    /// The name of the undefined glyph
    pub const NOTDEF: GlyphName = GlyphName(SmolStr::new_inline(".notdef"));

    pub fn new(s: impl AsRef<str>) -> Self {
        Self(SmolStr::new(s))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for GlyphName {
    fn from(value: String) -> Self {
        GlyphName(value.into())
    }
}

impl From<&str> for GlyphName {
    fn from(value: &str) -> Self {
        GlyphName(value.into())
    }
}

impl Debug for GlyphName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Display for GlyphName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for GlyphName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

// lets a HashSet<GlyphName> be queried with &str
impl std::borrow::Borrow<str> for GlyphName {
    fn borrow(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq<&str> for GlyphName {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

/// A single axis of variation.
///
/// The user range and the (optional) user:design mapping are fixed at
/// construction; the converter carries the out of range policy.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Axis {
    pub name: String,
    pub tag: Tag,
    pub min: UserCoord,
    pub default: UserCoord,
    pub max: UserCoord,
    pub hidden: bool,
    pub converter: CoordConverter,
}

impl Axis {
    /// Create an axis, validating the range and the mapping.
    ///
    /// An empty mapping means user and design coordinates are identical.
    pub fn new(
        name: impl Into<String>,
        tag: Tag,
        min: UserCoord,
        default: UserCoord,
        max: UserCoord,
        mapping: Vec<(UserCoord, DesignCoord)>,
    ) -> Result<Axis, Error> {
        if !(min <= default && default <= max) {
            return Err(Error::InvalidAxis {
                tag,
                reason: format!(
                    "default {} is not within {}..={}",
                    default.to_f64(),
                    min.to_f64(),
                    max.to_f64()
                ),
            });
        }
        let converter = if mapping.is_empty() {
            CoordConverter::unmapped(min, default, max)
        } else {
            let Some(default_idx) = mapping.iter().position(|(user, _)| *user == default) else {
                return Err(Error::InvalidAxis {
                    tag,
                    reason: format!("mapping has no entry for default {}", default.to_f64()),
                });
            };
            CoordConverter::new(mapping, default_idx)
        }
        .map_err(|e| Error::InvalidAxis {
            tag,
            reason: e.to_string(),
        })?;
        Ok(Axis {
            name: name.into(),
            tag,
            min,
            default,
            max,
            hidden: false,
            converter,
        })
    }

    /// For testing, an unmapped axis
    #[doc(hidden)]
    pub fn for_test(tag: &str, min: f64, default: f64, max: f64) -> Axis {
        let tag = Tag::new_checked(tag.as_bytes()).unwrap();
        Axis::new(
            tag.to_string(),
            tag,
            UserCoord::new(min),
            UserCoord::new(default),
            UserCoord::new(max),
            Vec::new(),
        )
        .unwrap()
    }

    pub fn is_point(&self) -> bool {
        self.min == self.default && self.max == self.default
    }

    pub fn default_design(&self) -> DesignCoord {
        self.converter.default_design()
    }

    /// The design range covered by the axis' mapping
    pub fn design_range(&self) -> (DesignCoord, DesignCoord) {
        (
            self.min.to_design(&self.converter),
            self.max.to_design(&self.converter),
        )
    }
}

/// An ordered collection of axes, searchable by tag.
#[derive(Serialize, Deserialize, Debug, Default, Clone, PartialEq, Eq)]
pub struct Axes {
    axes: Vec<Axis>,
    #[serde(skip)]
    by_tag: HashMap<Tag, usize>,
}

impl Axes {
    pub fn new(axes: Vec<Axis>) -> Result<Axes, Error> {
        let mut by_tag = HashMap::new();
        for (idx, axis) in axes.iter().enumerate() {
            if by_tag.insert(axis.tag, idx).is_some() {
                return Err(Error::InvalidAxis {
                    tag: axis.tag,
                    reason: "declared more than once".to_string(),
                });
            }
        }
        Ok(Axes { axes, by_tag })
    }

    pub fn get(&self, tag: &Tag) -> Option<&Axis> {
        self.by_tag
            .get(tag)
            .and_then(|idx| self.axes.get(*idx))
            .or_else(|| self.axes.iter().find(|a| a.tag == *tag))
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.get(tag).is_some()
    }

    /// Find an axis by its name, as designspace locations refer to it
    pub fn by_name(&self, name: &str) -> Option<&Axis> {
        self.axes.iter().find(|a| a.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Axis> {
        self.axes.iter()
    }

    pub fn len(&self) -> usize {
        self.axes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    /// Tags of all non-point axes, in declaration order.
    pub fn axis_order(&self) -> Vec<Tag> {
        self.axes
            .iter()
            .filter(|a| !a.is_point())
            .map(|a| a.tag)
            .collect()
    }

    /// A copy whose converters treat out of range values per out_of_range
    pub fn with_out_of_range(&self, out_of_range: OutOfRange) -> Axes {
        let axes = self
            .axes
            .iter()
            .map(|a| Axis {
                converter: a.converter.with_out_of_range(out_of_range),
                ..a.clone()
            })
            .collect();
        Axes {
            axes,
            by_tag: self.by_tag.clone(),
        }
    }

    pub fn default_user_location(&self) -> UserLocation {
        self.axes.iter().map(|a| (a.tag, a.default)).collect()
    }

    pub fn default_design_location(&self) -> DesignLocation {
        self.axes
            .iter()
            .map(|a| (a.tag, a.default_design()))
            .collect()
    }

    pub fn default_normalized_location(&self) -> NormalizedLocation {
        self.axes
            .iter()
            .map(|a| (a.tag, NormalizedCoord::new(0.0)))
            .collect()
    }
}

impl<'a> IntoIterator for &'a Axes {
    type Item = &'a Axis;
    type IntoIter = std::slice::Iter<'a, Axis>;

    fn into_iter(self) -> Self::IntoIter {
        self.axes.iter()
    }
}
