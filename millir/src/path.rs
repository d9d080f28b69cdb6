//! Conversion between UFO style point streams and bezier paths.

use kurbo::{BezPath, PathEl, Point};

use crate::error::PathConversionError;

/// Helps convert points-of-type to a bezier path.
///
/// Sources store contours as streams of typed points, filters and the
/// assembler prefer [`BezPath`]. Each contour is converted separately, a
/// [`crate::font::Glyph`] holds one path per contour.
#[derive(Debug)]
pub struct GlyphPathBuilder {
    offcurve: Vec<Point>,
    leading_offcurve: Vec<Point>,
    path: Vec<PathEl>,
    first_oncurve: Option<OnCurve>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
enum OnCurve {
    Move(Point),
    Line(Point),
    Quad(Point),
    Cubic(Point),
}

impl OnCurve {
    fn point(&self) -> Point {
        match self {
            OnCurve::Move(p) | OnCurve::Line(p) | OnCurve::Quad(p) | OnCurve::Cubic(p) => *p,
        }
    }
}

impl GlyphPathBuilder {
    pub fn new(estimated_num_elements: usize) -> GlyphPathBuilder {
        GlyphPathBuilder {
            offcurve: Vec::with_capacity(2),
            leading_offcurve: Vec::new(),
            // closing often adds a couple more
            path: Vec::with_capacity(estimated_num_elements + 2),
            first_oncurve: None,
        }
    }

    fn expect_offcurves(&self, ok: impl Fn(usize) -> bool) -> Result<(), PathConversionError> {
        if ok(self.offcurve.len()) {
            return Ok(());
        }
        Err(PathConversionError::TooManyOffcurvePoints {
            num_offcurve: self.offcurve.len(),
            points: self.offcurve.clone(),
        })
    }

    fn is_empty(&self) -> bool {
        self.first_oncurve.is_none() && self.leading_offcurve.is_empty()
    }

    fn begin_path(&mut self, oncurve: OnCurve) {
        self.path.push(PathEl::MoveTo(oncurve.point()));
        self.first_oncurve = Some(oncurve);
    }

    /// Start an open contour at `p`.
    ///
    /// Only legal as the first point of a contour.
    /// See "move" in <https://unifiedfontobject.org/versions/ufo3/glyphs/glif/#point-types>
    pub fn move_to(&mut self, p: impl Into<Point>) -> Result<(), PathConversionError> {
        if !self.is_empty() {
            return Err(PathConversionError::MoveAfterFirstPoint { point: p.into() });
        }
        self.begin_path(OnCurve::Move(p.into()));
        Ok(())
    }

    /// A straight line to `p`; no offcurves may be pending.
    ///
    /// As the first point, marks the contour closed.
    pub fn line_to(&mut self, p: impl Into<Point>) -> Result<(), PathConversionError> {
        self.expect_offcurves(|n| n == 0)?;
        let p = p.into();
        if self.first_oncurve.is_none() {
            self.begin_path(OnCurve::Line(p));
        } else {
            self.path.push(PathEl::LineTo(p));
        }
        Ok(())
    }

    /// A TrueType style quadratic spline to `p`.
    ///
    /// Any number of pending offcurves is allowed; on-curve points are implied
    /// halfway between consecutive offcurves. With none pending this is a line.
    pub fn qcurve_to(&mut self, p: impl Into<Point>) -> Result<(), PathConversionError> {
        let p = p.into();
        if self.first_oncurve.is_none() {
            self.begin_path(OnCurve::Quad(p));
            return Ok(());
        }
        let Some(last) = self.offcurve.last().copied() else {
            return self.line_to(p);
        };
        for pair in self.offcurve.windows(2) {
            self.path
                .push(PathEl::QuadTo(pair[0], pair[0].midpoint(pair[1])));
        }
        self.path.push(PathEl::QuadTo(last, p));
        self.offcurve.clear();
        Ok(())
    }

    /// A cubic curve to `p`.
    ///
    /// Zero pending offcurves make a line, one a quadratic, two a cubic.
    pub fn curve_to(&mut self, p: impl Into<Point>) -> Result<(), PathConversionError> {
        let p = p.into();
        if self.first_oncurve.is_none() {
            self.begin_path(OnCurve::Cubic(p));
            return Ok(());
        }
        match self.offcurve[..] {
            [] => self.path.push(PathEl::LineTo(p)),
            [c0] => self.path.push(PathEl::QuadTo(c0, p)),
            [c0, c1] => self.path.push(PathEl::CurveTo(c0, c1, p)),
            _ => self.expect_offcurves(|n| n < 3)?,
        }
        self.offcurve.clear();
        Ok(())
    }

    /// Queue an offcurve for the next curve or qcurve.
    ///
    /// Offcurves before the first oncurve wrap around to the end of a closed contour.
    pub fn offcurve(&mut self, p: impl Into<Point>) -> Result<(), PathConversionError> {
        if self.first_oncurve.is_some() {
            self.offcurve.push(p.into());
        } else {
            self.leading_offcurve.push(p.into());
        }
        Ok(())
    }

    fn end_path(&mut self) -> Result<(), PathConversionError> {
        // anything that does not start with a move is closed
        if !matches!(self.first_oncurve, Some(OnCurve::Move(_))) {
            self.close_path()?;
        }
        self.expect_offcurves(|n| n == 0)?;
        self.first_oncurve = None;
        Ok(())
    }

    fn close_path(&mut self) -> Result<(), PathConversionError> {
        // closed contours start and end on their first oncurve, like fontTools' PointToSegmentPen
        self.offcurve.append(&mut self.leading_offcurve);
        match self.first_oncurve {
            // the closing segment is always emitted, even when Z would imply it
            Some(OnCurve::Line(pt)) => self.line_to(pt)?,
            Some(OnCurve::Quad(pt)) => self.qcurve_to(pt)?,
            Some(OnCurve::Cubic(pt)) => self.curve_to(pt)?,
            Some(OnCurve::Move(_)) => return Ok(()),
            None => {
                let (Some(first), Some(last)) =
                    (self.offcurve.first().copied(), self.offcurve.last().copied())
                else {
                    return Ok(());
                };
                // quadratic contour made only of offcurves, start at an implied oncurve
                self.begin_path(OnCurve::Quad(first.midpoint(last)));
                return self.close_path();
            }
        }
        self.path.push(PathEl::ClosePath);
        Ok(())
    }

    /// Builds the kurbo::BezPath from the accumulated points.
    pub fn build(mut self) -> Result<BezPath, PathConversionError> {
        self.end_path()?;
        Ok(BezPath::from_vec(self.path))
    }
}

/// UFO point types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointType {
    Move,
    Line,
    OffCurve,
    Curve,
    QCurve,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourPoint {
    pub x: f64,
    pub y: f64,
    pub typ: PointType,
}

impl ContourPoint {
    fn new(p: Point, typ: PointType) -> ContourPoint {
        ContourPoint { x: p.x, y: p.y, typ }
    }
}

/// The inverse of [`GlyphPathBuilder`]: one contour back to typed points.
///
/// A closed contour lists its starting oncurve first, typed by the segment
/// that closes onto it, so rebuilding yields the same path.
pub fn to_contour_points(path: &BezPath) -> Result<Vec<ContourPoint>, PathConversionError> {
    let mut points = Vec::new();
    let mut start = None;
    let mut closed = false;
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => {
                if start.is_some() {
                    return Err(PathConversionError::Unsupported(
                        "more than one subpath".to_string(),
                    ));
                }
                start = Some(p);
                points.push(ContourPoint::new(p, PointType::Move));
            }
            PathEl::LineTo(p) => points.push(ContourPoint::new(p, PointType::Line)),
            PathEl::QuadTo(c, p) => {
                points.push(ContourPoint::new(c, PointType::OffCurve));
                points.push(ContourPoint::new(p, PointType::QCurve));
            }
            PathEl::CurveTo(c0, c1, p) => {
                points.push(ContourPoint::new(c0, PointType::OffCurve));
                points.push(ContourPoint::new(c1, PointType::OffCurve));
                points.push(ContourPoint::new(p, PointType::Curve));
            }
            PathEl::ClosePath => closed = true,
        }
    }
    let Some(start) = start else {
        return Ok(points);
    };
    if !closed {
        return Ok(points);
    }

    // drop the move; if the last segment didn't return to start, start is a line
    points.remove(0);
    let returns_to_start = points
        .last()
        .is_some_and(|p| p.typ != PointType::OffCurve && Point::new(p.x, p.y) == start);
    match points.pop() {
        Some(last) if returns_to_start => points.insert(0, last),
        Some(last) => {
            points.push(last);
            points.insert(0, ContourPoint::new(start, PointType::Line));
        }
        None => points.push(ContourPoint::new(start, PointType::Line)),
    }
    Ok(points)
}

/// Rebuild a path from typed points.
pub fn from_contour_points(points: &[ContourPoint]) -> Result<BezPath, PathConversionError> {
    let mut builder = GlyphPathBuilder::new(points.len());
    for point in points {
        let p = (point.x, point.y);
        match point.typ {
            PointType::Move => builder.move_to(p)?,
            PointType::Line => builder.line_to(p)?,
            PointType::OffCurve => builder.offcurve(p)?,
            PointType::Curve => builder.curve_to(p)?,
            PointType::QCurve => builder.qcurve_to(p)?,
        }
    }
    builder.build()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn svg(build: impl FnOnce(&mut GlyphPathBuilder)) -> String {
        let mut builder = GlyphPathBuilder::new(0);
        build(&mut builder);
        builder.build().unwrap().to_svg()
    }

    #[test]
    fn lines_without_offcurves() {
        let open = svg(|b| {
            b.move_to((2.0, 2.0)).unwrap();
            b.qcurve_to((4.0, 2.0)).unwrap();
        });
        assert_eq!("M2,2 L4,2", open);
        let closed = svg(|b| {
            b.curve_to((2.0, 2.0)).unwrap();
            b.curve_to((4.0, 2.0)).unwrap();
        });
        assert_eq!("M2,2 L4,2 L2,2 Z", closed);
    }

    #[test]
    fn one_offcurve_makes_a_quad() {
        let path = svg(|b| {
            b.curve_to((2.0, 2.0)).unwrap();
            b.offcurve((3.0, 0.0)).unwrap();
            b.curve_to((4.0, 2.0)).unwrap();
        });
        assert_eq!("M2,2 Q3,0 4,2 L2,2 Z", path);
    }

    #[test]
    fn qcurve_implies_oncurves_between_offcurves() {
        let path = svg(|b| {
            b.move_to((2.0, 2.0)).unwrap();
            b.offcurve((3.0, 0.0)).unwrap();
            b.offcurve((5.0, 4.0)).unwrap();
            b.qcurve_to((6.0, 2.0)).unwrap();
        });
        assert_eq!("M2,2 Q3,0 4,2 Q5,4 6,2", path);
    }

    #[test]
    fn closing_segment_onto_start_has_no_extra_line() {
        let path = svg(|b| {
            b.offcurve((3.0, 0.0)).unwrap();
            b.offcurve((0.0, 3.0)).unwrap();
            b.curve_to((2.0, 2.0)).unwrap();
        });
        assert_eq!("M2,2 C3,0 0,3 2,2 Z", path);
    }

    #[test]
    fn leading_offcurves_wrap_to_the_end() {
        let expected = "M2,2 C6,0 0,6 4,2 C3,0 0,3 2,2 Z";
        let leading = svg(|b| {
            b.offcurve((0.0, 3.0)).unwrap();
            b.curve_to((2.0, 2.0)).unwrap();
            b.offcurve((6.0, 0.0)).unwrap();
            b.offcurve((0.0, 6.0)).unwrap();
            b.curve_to((4.0, 2.0)).unwrap();
            b.offcurve((3.0, 0.0)).unwrap();
        });
        let trailing = svg(|b| {
            b.curve_to((2.0, 2.0)).unwrap();
            b.offcurve((6.0, 0.0)).unwrap();
            b.offcurve((0.0, 6.0)).unwrap();
            b.curve_to((4.0, 2.0)).unwrap();
            b.offcurve((3.0, 0.0)).unwrap();
            b.offcurve((0.0, 3.0)).unwrap();
        });
        assert_eq!(expected, leading);
        assert_eq!(expected, trailing);
    }

    #[test]
    fn offcurve_only_quadratic_contour() {
        let path = svg(|b| {
            b.offcurve((1.0, 1.0)).unwrap();
            b.offcurve((1.0, -1.0)).unwrap();
            b.offcurve((-1.0, -1.0)).unwrap();
            b.offcurve((-1.0, 1.0)).unwrap();
        });
        assert_eq!("M0,1 Q1,1 1,0 Q1,-1 0,-1 Q-1,-1 -1,0 Q-1,1 0,1 Z", path);
    }

    #[test]
    fn move_only_first() {
        let mut builder = GlyphPathBuilder::new(0);
        builder.line_to((5.0, 5.0)).unwrap();
        assert_eq!(
            Err(PathConversionError::MoveAfterFirstPoint {
                point: (6.0, 6.0).into()
            }),
            builder.move_to((6.0, 6.0))
        );
    }

    #[test]
    fn three_offcurves_before_curve_is_an_error() {
        let mut builder = GlyphPathBuilder::new(0);
        builder.move_to((0.0, 0.0)).unwrap();
        for x in 1..4 {
            builder.offcurve((x as f64, 1.0)).unwrap();
        }
        assert!(matches!(
            builder.curve_to((5.0, 0.0)),
            Err(PathConversionError::TooManyOffcurvePoints {
                num_offcurve: 3,
                ..
            })
        ));
    }

    #[test]
    fn points_rebuild_the_same_path() {
        for svg in [
            "M2,2 L4,2 L2,2 Z",
            "M2,2 C6,0 0,6 4,2 C3,0 0,3 2,2 Z",
            "M10,0 L0,10 Q5,10 7.5,7.5 Q10,5 10,0 Z",
            "M2,2 Q3,0 4,2 Q5,4 6,2",
        ] {
            let path = BezPath::from_svg(svg).unwrap();
            let points = to_contour_points(&path).unwrap();
            assert_eq!(svg, from_contour_points(&points).unwrap().to_svg());
        }
    }

    #[test]
    fn closed_contour_starts_with_its_closing_oncurve() {
        let path = BezPath::from_svg("M0,0 L10,0 L10,10 L0,0 Z").unwrap();
        let types: Vec<_> = to_contour_points(&path)
            .unwrap()
            .iter()
            .map(|p| (p.x, p.y, p.typ))
            .collect();
        assert_eq!(
            vec![
                (0.0, 0.0, PointType::Line),
                (10.0, 0.0, PointType::Line),
                (10.0, 10.0, PointType::Line),
            ],
            types
        );
    }
}
