//! Location labels: named user locations at the top of a designspace, and
//! the instances that refer to them by name.
//!
//! norad doesn't read either so we pick them out of the xml ourselves.

use std::path::Path;

use quick_xml::{
    events::{BytesStart, Event},
    Decoder, Reader,
};

use crate::error::Error;

/// A `<label>` under the top level `<labels>`
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LocationLabel {
    pub name: String,
    /// Axis name and user value, in document order
    pub location: Vec<(String, f64)>,
}

#[derive(Debug, Default, PartialEq)]
pub(crate) struct DesignSpaceLabels {
    pub labels: Vec<LocationLabel>,
    /// The `location` attribute of each instance, in document order
    pub instance_labels: Vec<Option<String>>,
}

fn is_at(path: &[Vec<u8>], expected: &[&str]) -> bool {
    path.len() == expected.len()
        && path
            .iter()
            .zip(expected)
            .all(|(element, name)| element.as_slice() == name.as_bytes())
}

fn attribute(
    element: &BytesStart,
    name: &str,
    decoder: Decoder,
) -> Result<Option<String>, quick_xml::Error> {
    element
        .try_get_attribute(name)?
        .map(|attr| {
            attr.decode_and_unescape_value(decoder)
                .map(|value| value.into_owned())
        })
        .transpose()
        .map_err(Into::into)
}

/// Read the location labels of the designspace at `path`
pub(crate) fn read_labels(path: &Path) -> Result<DesignSpaceLabels, Error> {
    let xml = std::fs::read_to_string(path).map_err(|source| Error::FileIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse_labels(&xml).map_err(|e| match e {
        LabelError::Xml(source) => Error::Xml {
            path: path.to_path_buf(),
            source,
        },
        LabelError::Malformed { entity, reason } => millir::Error::MalformedDesignSpace {
            entity,
            reason,
        }
        .into(),
    })
}

#[derive(Debug)]
enum LabelError {
    Xml(quick_xml::Error),
    Malformed { entity: String, reason: String },
}

impl From<quick_xml::Error> for LabelError {
    fn from(value: quick_xml::Error) -> Self {
        LabelError::Xml(value)
    }
}

fn malformed(entity: impl Into<String>, reason: impl Into<String>) -> LabelError {
    LabelError::Malformed {
        entity: entity.into(),
        reason: reason.into(),
    }
}

fn parse_labels(xml: &str) -> Result<DesignSpaceLabels, LabelError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let decoder = reader.decoder();

    let mut result = DesignSpaceLabels::default();
    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut label: Option<LocationLabel> = None;
    loop {
        let (element, has_children) = match reader.read_event()? {
            Event::Start(element) => (element, true),
            Event::Empty(element) => (element, false),
            Event::End(_) => {
                if is_at(&path, &["designspace", "labels", "label"]) {
                    result.labels.extend(label.take());
                }
                path.pop();
                continue;
            }
            Event::Eof => break,
            _ => continue,
        };

        if is_at(&path, &["designspace", "instances"]) && element.name().as_ref() == b"instance" {
            result
                .instance_labels
                .push(attribute(&element, "location", decoder)?);
        } else if is_at(&path, &["designspace", "labels"]) && element.name().as_ref() == b"label" {
            let name = attribute(&element, "name", decoder)?
                .ok_or_else(|| malformed("location label", "no name"))?;
            let new_label = LocationLabel {
                name,
                location: Vec::new(),
            };
            if has_children {
                label = Some(new_label);
            } else {
                result.labels.push(new_label);
            }
        } else if is_at(&path, &["designspace", "labels", "label", "location"])
            && element.name().as_ref() == b"dimension"
        {
            if let Some(label) = label.as_mut() {
                let entity = || format!("location label '{}'", label.name);
                let axis = attribute(&element, "name", decoder)?
                    .ok_or_else(|| malformed(entity(), "a dimension has no name"))?;
                let value = attribute(&element, "uservalue", decoder)?
                    .ok_or_else(|| malformed(entity(), format!("{axis} has no uservalue")))?;
                let value = value.parse::<f64>().map_err(|_| {
                    malformed(entity(), format!("{axis} uservalue '{value}' is not a number"))
                })?;
                label.location.push((axis, value));
            }
        }

        if has_children {
            path.push(element.name().as_ref().to_vec());
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const LABELLED: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<designspace format="5.0">
  <axes>
    <axis tag="wght" name="Weight" minimum="100" maximum="900" default="100">
      <labels>
        <label uservalue="400" name="Regular"/>
      </labels>
    </axis>
  </axes>
  <labels>
    <label name="Semibold">
      <location>
        <dimension name="Weight" uservalue="600"/>
      </location>
    </label>
    <label name="Nowhere"/>
  </labels>
  <instances>
    <instance name="Test Semibold" location="Semibold">
      <location>
        <dimension name="Weight" xvalue="100"/>
      </location>
    </instance>
    <instance name="Test Light">
      <location>
        <dimension name="Weight" xvalue="300"/>
      </location>
    </instance>
  </instances>
</designspace>
"#;

    #[test]
    fn reads_top_level_labels_only() {
        let labels = parse_labels(LABELLED).unwrap();
        assert_eq!(
            vec![
                LocationLabel {
                    name: "Semibold".to_string(),
                    location: vec![("Weight".to_string(), 600.0)],
                },
                LocationLabel {
                    name: "Nowhere".to_string(),
                    location: vec![],
                },
            ],
            labels.labels
        );
        assert_eq!(
            vec![Some("Semibold".to_string()), None],
            labels.instance_labels
        );
    }

    #[test]
    fn label_dimensions_need_user_values() {
        let xml = r#"<designspace format="5.0"><labels><label name="Bold"><location>
            <dimension name="Weight" xvalue="700"/>
            </location></label></labels></designspace>"#;
        assert!(matches!(
            parse_labels(xml),
            Err(LabelError::Malformed { reason, .. }) if reason.contains("uservalue")
        ));
    }
}
