//! Moves locations between user, design and normalized space.
//!
//! Every conversion goes through the piecewise linear maps held by each
//! [`Axis`]. Values exactly at a mapping knot come back exactly, so a round
//! trip through design space is the identity at every declared knot.

use log::trace;

use crate::{
    coords::{
        DesignCoord, DesignLocation, NormalizedCoord, NormalizedLocation, UserCoord, UserLocation,
    },
    piecewise_linear_map::OutOfRange,
    types::{Axes, Axis, Tag},
    Error,
};

#[derive(Debug, Clone)]
pub struct LocationResolver {
    axes: Axes,
}

impl LocationResolver {
    pub fn new(axes: &Axes, out_of_range: OutOfRange) -> LocationResolver {
        LocationResolver {
            axes: axes.with_out_of_range(out_of_range),
        }
    }

    pub fn axes(&self) -> &Axes {
        &self.axes
    }

    fn axis(&self, tag: Tag) -> Result<&Axis, Error> {
        self.axes.get(&tag).ok_or(Error::UnknownAxis(tag))
    }

    /// User coordinate to internal (design) coordinate for one axis
    pub fn to_internal(&self, coord: UserCoord, tag: Tag) -> Result<DesignCoord, Error> {
        Ok(coord.to_design(&self.axis(tag)?.converter))
    }

    /// Internal (design) coordinate to user coordinate for one axis
    pub fn to_user(&self, coord: DesignCoord, tag: Tag) -> Result<UserCoord, Error> {
        Ok(coord.to_user(&self.axis(tag)?.converter))
    }

    pub fn normalize(&self, coord: DesignCoord, tag: Tag) -> Result<NormalizedCoord, Error> {
        Ok(coord.to_normalized(&self.axis(tag)?.converter))
    }

    pub fn user_to_design(&self, loc: &UserLocation) -> Result<DesignLocation, Error> {
        loc.to_design(&self.axes)
    }

    pub fn design_to_user(&self, loc: &DesignLocation) -> Result<UserLocation, Error> {
        loc.to_user(&self.axes)
    }

    /// Normalize a design location, filling in the default for any missing axis.
    pub fn design_to_normalized(&self, loc: &DesignLocation) -> Result<NormalizedLocation, Error> {
        let loc = self.complete(loc)?;
        let normalized = loc.to_normalized(&self.axes)?;
        trace!("{loc:?} normalizes to {normalized:?}");
        Ok(normalized)
    }

    pub fn normalized_to_design(&self, loc: &NormalizedLocation) -> Result<DesignLocation, Error> {
        loc.to_design(&self.axes)
    }

    /// Fill in the default position for any axis the location omits.
    ///
    /// Fails if the location names an axis we don't have.
    pub fn complete(&self, loc: &DesignLocation) -> Result<DesignLocation, Error> {
        if let Some(tag) = loc.axis_tags().find(|tag| !self.axes.contains(tag)) {
            return Err(Error::UnknownAxis(*tag));
        }
        let mut complete = loc.clone();
        for axis in self.axes.iter() {
            if !complete.contains(axis.tag) {
                complete.insert(axis.tag, axis.default_design());
            }
        }
        Ok(complete)
    }

    /// The first axis on which the location falls outside the mapped design range.
    pub fn out_of_bounds(&self, loc: &DesignLocation) -> Option<(Tag, DesignCoord)> {
        loc.iter()
            .filter_map(|(tag, coord)| self.axes.get(tag).map(|a| (a, *coord)))
            .find(|(axis, coord)| !axis.converter.contains_design(*coord))
            .map(|(axis, coord)| (axis.tag, coord))
    }

    /// Fail unless every coordinate is within the axis' mapped range
    pub fn check_bounds(&self, loc: &DesignLocation) -> Result<(), Error> {
        match self.out_of_bounds(loc) {
            Some((tag, coord)) => Err(Error::OutOfRange {
                tag,
                value: coord.to_f64(),
            }),
            None => Ok(()),
        }
    }
}
