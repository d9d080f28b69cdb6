use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, trace, warn};
use millcore::{
    coords::{DesignCoord, DesignLocation, UserCoord, UserLocation},
    piecewise_linear_map::OutOfRange,
    types::{Axes, Axis, GlyphName, Tag},
};
use millir::{
    designspace::{DesignSpaceModel, Instance, Source},
    font::{Font, FontInfo},
    rules::{Condition, ConditionSet, Rule},
};
use norad::designspace::{self, DesignSpaceDocument, Dimension};

use crate::{
    error::Error,
    labels::{read_labels, LocationLabel},
    toir::{glyph_order, to_ir_glyphs, to_ir_groups, to_ir_kerning},
};

fn malformed(entity: impl Into<String>, reason: impl Into<String>) -> Error {
    millir::Error::MalformedDesignSpace {
        entity: entity.into(),
        reason: reason.into(),
    }
    .into()
}

/// Read a plist file that should contain a dictionary; missing is empty.
fn load_plist(ufo_dir: &Path, name: &str) -> Result<plist::Dictionary, Error> {
    let plist_file = ufo_dir.join(name);
    if !plist_file.is_file() {
        return Ok(Default::default());
    }
    plist::Value::from_file(&plist_file)
        .map_err(|source| Error::Plist {
            path: plist_file.clone(),
            source,
        })?
        .into_dictionary()
        .ok_or(Error::NotADictionary { path: plist_file })
}

/// Load a UFO, every layer included.
///
/// fontinfo is kept as the raw dictionary so keys we don't model survive
/// interpolation and saving.
pub fn load_ufo(ufo_dir: &Path) -> Result<Font, Error> {
    let ufo = norad::Font::load(ufo_dir).map_err(|e| Error::Ufo {
        path: ufo_dir.to_path_buf(),
        source: Box::new(e),
    })?;
    let info = FontInfo::new(load_plist(ufo_dir, "fontinfo.plist")?);

    let default_layer = ufo.default_layer();
    let names_in = |layer: &norad::Layer| -> HashSet<GlyphName> {
        layer.iter().map(|g| GlyphName::new(g.name().as_str())).collect()
    };
    let order = glyph_order(&ufo.lib, &names_in(default_layer));
    let glyphs = to_ir_glyphs(default_layer, &order)?;

    let mut layers = BTreeMap::new();
    for layer in ufo.layers.iter() {
        if layer.name() == default_layer.name() {
            continue;
        }
        let order = glyph_order(&ufo.lib, &names_in(layer));
        layers.insert(layer.name().to_string(), to_ir_glyphs(layer, &order)?);
    }
    debug!(
        "Loaded {ufo_dir:?}, {} glyphs and {} other layers",
        glyphs.len(),
        layers.len()
    );

    Ok(Font {
        info,
        glyphs,
        layers,
        kerning: to_ir_kerning(&ufo.kerning),
        groups: to_ir_groups(&ufo.groups),
        features: ufo.features.clone(),
        lib: ufo.lib.clone(),
    })
}

/// A model for a lone UFO: no axes, one source that is also the default.
pub fn load_ufo_as_model(ufo_dir: &Path) -> Result<DesignSpaceModel, Error> {
    let font = load_ufo(ufo_dir)?;
    let name = ufo_dir
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "master".to_string());
    let source = Source {
        name,
        filename: Some(ufo_dir.to_path_buf()),
        layer: None,
        location: DesignLocation::new(),
        family_name: font.info.family_name().map(str::to_string),
        style_name: font.info.style_name().map(str::to_string),
        font: Arc::new(font),
    };
    Ok(DesignSpaceModel::new(
        Axes::default(),
        vec![source],
        Vec::new(),
        Vec::new(),
        OutOfRange::Clamp,
    )?)
}

fn to_ir_axis(axis: &designspace::Axis) -> Result<Axis, Error> {
    let invalid = |reason: &str| Error::InvalidAxis {
        axis: axis.name.clone(),
        reason: reason.to_string(),
    };
    let tag = Tag::new_checked(axis.tag.as_bytes()).map_err(|e| invalid(&e.to_string()))?;

    // discrete axes list values instead of a range
    let values = axis.values.as_deref().unwrap_or_default();
    let lowest = values.iter().copied().reduce(f32::min);
    let highest = values.iter().copied().reduce(f32::max);
    let min = axis
        .minimum
        .or(lowest)
        .ok_or_else(|| invalid("no minimum"))?;
    let max = axis
        .maximum
        .or(highest)
        .ok_or_else(|| invalid("no maximum"))?;

    let mapping = axis
        .map
        .iter()
        .flatten()
        .map(|m| {
            (
                UserCoord::new(m.input as f64),
                DesignCoord::new(m.output as f64),
            )
        })
        .collect();
    let mut ir_axis = Axis::new(
        axis.name.clone(),
        tag,
        UserCoord::new(min as f64),
        UserCoord::new(axis.default as f64),
        UserCoord::new(max as f64),
        mapping,
    )?;
    ir_axis.hidden = axis.hidden;
    Ok(ir_axis)
}

/// Designspace locations name axes by name and may give user or design values.
///
/// Returns the x (or only) location and, when any dimension has a y value,
/// the y location.
fn to_design_location(
    entity: &str,
    axes: &Axes,
    dimensions: &[Dimension],
) -> Result<(DesignLocation, Option<DesignLocation>), Error> {
    let mut x_location = DesignLocation::new();
    let mut y_location = DesignLocation::new();
    let mut anisotropic = false;
    for dim in dimensions {
        let Some(axis) = axes.by_name(&dim.name) else {
            return Err(malformed(entity, format!("no axis named '{}'", dim.name)));
        };
        let x = match (dim.xvalue, dim.uservalue) {
            (Some(x), _) => DesignCoord::new(x as f64),
            (None, Some(user)) => UserCoord::new(user as f64).to_design(&axis.converter),
            (None, None) => {
                return Err(malformed(entity, format!("no value for '{}'", dim.name)));
            }
        };
        x_location.insert(axis.tag, x);
        match dim.yvalue {
            Some(y) => {
                anisotropic = true;
                y_location.insert(axis.tag, DesignCoord::new(y as f64));
            }
            None => {
                y_location.insert(axis.tag, x);
            }
        }
    }
    Ok((x_location, anisotropic.then_some(y_location)))
}

fn to_ir_rule(axes: &Axes, rule: &designspace::Rule) -> Result<Rule, Error> {
    let name = rule.name.clone().unwrap_or_default();
    let condition_sets = rule
        .condition_sets
        .iter()
        .map(|set| {
            set.conditions
                .iter()
                .map(|c| {
                    let Some(axis) = axes.by_name(&c.name) else {
                        return Err(malformed(
                            format!("rule '{name}'"),
                            format!("no axis named '{}'", c.name),
                        ));
                    };
                    Ok(Condition::new(
                        axis.tag,
                        c.minimum.map(|v| DesignCoord::new(v as f64)),
                        c.maximum.map(|v| DesignCoord::new(v as f64)),
                    ))
                })
                .collect::<Result<_, _>>()
                .map(ConditionSet)
        })
        .collect::<Result<_, _>>()?;
    let substitutions = rule
        .substitutions
        .iter()
        .map(|sub| (GlyphName::new(&sub.name), GlyphName::new(&sub.with)))
        .collect();
    Ok(Rule {
        name,
        condition_sets,
        substitutions,
    })
}

fn to_ir_instance(
    axes: &Axes,
    idx: usize,
    instance: &designspace::Instance,
    location_label: Option<String>,
) -> Result<Instance, Error> {
    let entity = format!("instance {idx}");
    let (location, y_location) = to_design_location(&entity, axes, &instance.location)?;
    Ok(Instance {
        name: instance.name.clone(),
        family_name: instance.familyname.clone(),
        style_name: instance.stylename.clone(),
        postscript_font_name: instance.postscriptfontname.clone(),
        style_map_family_name: instance.stylemapfamilyname.clone(),
        style_map_style_name: instance.stylemapstylename.clone(),
        filename: instance.filename.as_ref().map(PathBuf::from),
        location,
        y_location,
        location_label,
        lib: instance.lib.clone(),
    })
}

fn to_user_location(axes: &Axes, label: &LocationLabel) -> Result<UserLocation, Error> {
    label
        .location
        .iter()
        .map(|(name, value)| match axes.by_name(name) {
            Some(axis) => Ok((axis.tag, UserCoord::new(*value))),
            None => Err(malformed(
                format!("location label '{}'", label.name),
                format!("no axis named '{name}'"),
            )),
        })
        .collect()
}

/// Load a designspace and every UFO it references.
///
/// Sources sharing a UFO, typically a master and its sparse layers, share
/// one loaded [`Font`].
pub fn load_designspace(
    designspace_file: &Path,
    out_of_range: OutOfRange,
) -> Result<DesignSpaceModel, Error> {
    let doc = DesignSpaceDocument::load(designspace_file).map_err(|source| Error::Designspace {
        path: designspace_file.to_path_buf(),
        source,
    })?;
    let designspace_dir = designspace_file
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();

    let axes = Axes::new(doc.axes.iter().map(to_ir_axis).collect::<Result<_, _>>()?)?;

    let mut ufos: HashMap<PathBuf, Arc<Font>> = HashMap::new();
    let mut sources = Vec::with_capacity(doc.sources.len());
    for (idx, source) in doc.sources.iter().enumerate() {
        let name = source
            .name
            .clone()
            .unwrap_or_else(|| format!("source {idx}"));
        let ufo_dir = designspace_dir.join(&source.filename);
        let font = match ufos.get(&ufo_dir) {
            Some(font) => font.clone(),
            None => {
                let font = Arc::new(load_ufo(&ufo_dir)?);
                ufos.insert(ufo_dir.clone(), font.clone());
                font
            }
        };
        let (location, y_location) =
            to_design_location(&format!("source '{name}'"), &axes, &source.location)?;
        if y_location.is_some() {
            warn!("Source '{name}' has a y value; sources are not anisotropic, ignoring it");
        }
        trace!("Source '{name}' at {location:?}");
        sources.push(Source {
            name,
            filename: Some(ufo_dir),
            layer: source.layer.clone(),
            location,
            family_name: source.familyname.clone(),
            style_name: source.stylename.clone(),
            font,
        });
    }

    let labels = read_labels(designspace_file)?;
    let instances = doc
        .instances
        .iter()
        .enumerate()
        .map(|(idx, instance)| {
            let label = labels.instance_labels.get(idx).cloned().flatten();
            to_ir_instance(&axes, idx, instance, label)
        })
        .collect::<Result<_, _>>()?;
    let location_labels = labels
        .labels
        .iter()
        .map(|label| Ok((label.name.clone(), to_user_location(&axes, label)?)))
        .collect::<Result<BTreeMap<_, _>, Error>>()?;
    let rules = doc
        .rules
        .rules
        .iter()
        .map(|rule| to_ir_rule(&axes, rule))
        .collect::<Result<_, _>>()?;

    let model = DesignSpaceModel::new(axes, sources, instances, rules, out_of_range)?
        .with_labels(location_labels)?
        .with_lib(doc.lib.clone());
    model.warn_about_orphan_glyphs();
    Ok(model)
}

#[cfg(test)]
mod tests {
    use kurbo::{Affine, BezPath};
    use millir::font::{Anchor, Component, Glyph};
    use pretty_assertions::assert_eq;
    use tempfile::{tempdir, TempDir};

    use crate::{save_ufo, DesignSpaceWriter};

    use super::*;

    fn square(size: f64) -> BezPath {
        let mut path = BezPath::new();
        path.move_to((0.0, 0.0));
        path.line_to((0.0, size));
        path.line_to((size, size));
        path.line_to((size, 0.0));
        path.line_to((0.0, 0.0));
        path.close_path();
        path
    }

    fn master(style: &str, stem: f64) -> Font {
        let mut font = Font::new();
        font.info.set("familyName", "Test");
        font.info.set("styleName", style);
        font.info.set("unitsPerEm", 1000i64);
        font.add_glyph(Glyph::new(".notdef").with_width(500.0));
        let mut a = Glyph::new("a")
            .with_width(400.0 + stem)
            .with_codepoint('a')
            .with_contour(square(stem));
        a.anchors.push(Anchor::new("top", (stem / 2.0, 500.0)));
        font.add_glyph(a);
        font.add_glyph(
            Glyph::new("aacute")
                .with_width(400.0 + stem)
                .with_component(Component::new("a", Affine::translate((10.0, 0.0)))),
        );
        font.kerning.insert(("a".to_string(), "a".to_string()), -stem / 2.0);
        font.groups.insert(
            "public.kern1.a".to_string(),
            vec![GlyphName::new("a"), GlyphName::new("aacute")],
        );
        font.features = "languagesystem DFLT dflt;\n".to_string();
        font
    }

    fn wght_axes() -> Axes {
        Axes::new(vec![Axis::for_test("wght", 100.0, 100.0, 900.0)]).unwrap()
    }

    fn write_wght_designspace(dir: &TempDir) -> PathBuf {
        let axes = wght_axes();
        let light = master("Light", 20.0);
        let mut bold = master("Bold", 100.0);
        bold.layers.insert(
            "support".to_string(),
            [("a".into(), Glyph::new("a").with_width(480.0).with_contour(square(60.0)))]
                .into_iter()
                .collect(),
        );
        save_ufo(&light, &dir.path().join("Test-Light.ufo")).unwrap();
        save_ufo(&bold, &dir.path().join("Test-Bold.ufo")).unwrap();

        let mut instance = Instance::new(DesignLocation::for_pos(&[("wght", 500.0)]));
        instance.family_name = Some("Test".to_string());
        instance.style_name = Some("Medium".to_string());
        instance.name = Some("Test Medium".to_string());

        let path = dir.path().join("Test.designspace");
        DesignSpaceWriter::new(&axes)
            .source(
                "light",
                "Test-Light.ufo",
                &DesignLocation::for_pos(&[("wght", 100.0)]),
                None,
            )
            .source(
                "bold",
                "Test-Bold.ufo",
                &DesignLocation::for_pos(&[("wght", 900.0)]),
                None,
            )
            .source(
                "bold support",
                "Test-Bold.ufo",
                &DesignLocation::for_pos(&[("wght", 600.0)]),
                Some("support"),
            )
            .instance(&instance)
            .rule(&Rule {
                name: "heavy".to_string(),
                condition_sets: vec![ConditionSet(vec![Condition::new(
                    Tag::new(b"wght"),
                    Some(DesignCoord::new(700.0)),
                    None,
                )])],
                substitutions: vec![("a".into(), "a.heavy".into())],
            })
            .unwrap()
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn ufo_survives_a_round_trip() {
        let temp_dir = tempdir().unwrap();
        let ufo_dir = temp_dir.path().join("Test-Light.ufo");
        let font = master("Light", 20.0);
        save_ufo(&font, &ufo_dir).unwrap();
        let loaded = load_ufo(&ufo_dir).unwrap();

        assert_eq!(
            font.glyph_order().collect::<Vec<_>>(),
            loaded.glyph_order().collect::<Vec<_>>()
        );
        assert_eq!(font.glyphs, loaded.glyphs);
        assert_eq!(font.kerning, loaded.kerning);
        assert_eq!(font.groups, loaded.groups);
        assert_eq!(font.features, loaded.features);
        assert_eq!(Some("Light"), loaded.info.style_name());
        assert_eq!(1000.0, loaded.info.units_per_em());
    }

    #[test]
    fn loads_designspace_sources_and_layers() {
        let temp_dir = tempdir().unwrap();
        let path = write_wght_designspace(&temp_dir);
        let model = load_designspace(&path, OutOfRange::Clamp).unwrap();

        assert_eq!(vec![Tag::new(b"wght")], model.axes().axis_order());
        assert_eq!(
            vec!["light", "bold", "bold support"],
            model
                .sources()
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
        );
        assert_eq!("light", model.default_source().name);

        // master and support layer share the loaded UFO
        let bold = &model.sources()[1];
        let support = &model.sources()[2];
        assert!(Arc::ptr_eq(&bold.font, &support.font));
        assert!(support.is_layer());
        assert_eq!(
            vec!["a"],
            support
                .glyphs()
                .unwrap()
                .keys()
                .map(|n| n.as_str())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn loads_instances_and_rules() {
        let temp_dir = tempdir().unwrap();
        let path = write_wght_designspace(&temp_dir);
        let model = load_designspace(&path, OutOfRange::Clamp).unwrap();

        let [instance] = model.instances() else {
            panic!("Expected one instance, got {:?}", model.instances());
        };
        assert_eq!(Some("Medium"), instance.style_name.as_deref());
        assert_eq!(DesignLocation::for_pos(&[("wght", 500.0)]), instance.location);
        assert_eq!(None, instance.y_location);

        let [rule] = model.rules() else {
            panic!("Expected one rule, got {:?}", model.rules());
        };
        assert_eq!("heavy", rule.name);
        assert_eq!(
            vec![(GlyphName::new("a"), GlyphName::new("a.heavy"))],
            rule.substitutions
        );
    }

    #[test]
    fn labelled_instance_loads_at_the_label() {
        let temp_dir = tempdir().unwrap();
        save_ufo(&master("Light", 20.0), &temp_dir.path().join("Test-Light.ufo")).unwrap();
        save_ufo(&master("Bold", 100.0), &temp_dir.path().join("Test-Bold.ufo")).unwrap();
        let path = temp_dir.path().join("Test.designspace");
        std::fs::write(
            &path,
            r#"<?xml version='1.0' encoding='UTF-8'?>
<designspace format="5.0">
  <axes>
    <axis tag="wght" name="Weight" minimum="100" maximum="900" default="100"/>
  </axes>
  <labels>
    <label name="Semibold">
      <location>
        <dimension name="Weight" uservalue="600"/>
      </location>
    </label>
  </labels>
  <sources>
    <source filename="Test-Light.ufo" name="light">
      <location>
        <dimension name="Weight" xvalue="100"/>
      </location>
    </source>
    <source filename="Test-Bold.ufo" name="bold">
      <location>
        <dimension name="Weight" xvalue="900"/>
      </location>
    </source>
  </sources>
  <instances>
    <instance familyname="Test" stylename="Semibold" location="Semibold">
      <location>
        <dimension name="Weight" xvalue="100"/>
      </location>
    </instance>
  </instances>
</designspace>
"#,
        )
        .unwrap();
        let model = load_designspace(&path, OutOfRange::Clamp).unwrap();

        let [instance] = model.instances() else {
            panic!("Expected one instance, got {:?}", model.instances());
        };
        assert_eq!(Some("Semibold"), instance.location_label.as_deref());
        assert_eq!(DesignLocation::for_pos(&[("wght", 600.0)]), instance.location);
        assert_eq!(
            Some(DesignLocation::for_pos(&[("wght", 600.0)])),
            model.label_location("Semibold").unwrap()
        );
    }

    #[test]
    fn lone_ufo_is_its_own_default() {
        let temp_dir = tempdir().unwrap();
        let ufo_dir = temp_dir.path().join("Test-Bold.ufo");
        save_ufo(&master("Bold", 100.0), &ufo_dir).unwrap();
        let model = load_ufo_as_model(&ufo_dir).unwrap();
        assert!(model.axes().is_empty());
        assert_eq!("Test-Bold", model.default_source().name);
        assert_eq!(Some("Bold"), model.default_source().style_name.as_deref());
    }

    #[test]
    fn missing_ufo_is_an_error() {
        let temp_dir = tempdir().unwrap();
        let result = load_ufo(&temp_dir.path().join("Nope.ufo"));
        assert!(matches!(result, Err(Error::Ufo { .. })), "{result:?}");
    }

    #[test]
    fn location_with_unknown_axis_is_malformed() {
        let dims = vec![Dimension {
            name: "Slant".to_string(),
            xvalue: Some(0.0),
            ..Default::default()
        }];
        let result = to_design_location("source 'x'", &wght_axes(), &dims);
        assert!(
            matches!(
                result,
                Err(Error::Ir(millir::Error::MalformedDesignSpace { .. }))
            ),
            "{result:?}"
        );
    }

    #[test]
    fn user_value_maps_to_design() {
        let axes = Axes::new(vec![Axis::new(
            "Weight",
            Tag::new(b"wght"),
            UserCoord::new(100.0),
            UserCoord::new(400.0),
            UserCoord::new(900.0),
            vec![
                (UserCoord::new(100.0), DesignCoord::new(20.0)),
                (UserCoord::new(400.0), DesignCoord::new(80.0)),
                (UserCoord::new(900.0), DesignCoord::new(200.0)),
            ],
        )
        .unwrap()])
        .unwrap();
        let dims = vec![Dimension {
            name: "Weight".to_string(),
            uservalue: Some(400.0),
            yvalue: Some(90.0),
            ..Default::default()
        }];
        let (x, y) = to_design_location("instance 0", &axes, &dims).unwrap();
        assert_eq!(DesignLocation::for_pos(&[("wght", 80.0)]), x);
        assert_eq!(Some(DesignLocation::for_pos(&[("wght", 90.0)])), y);
    }
}
