//! Pascal VOC XML annotation writer and reader.
//!
//! Documents always carry the same tags in the same order, which is what
//! downstream training tools key on:
//!
//! ```text
//! annotation
//!   folder, filename, path, source/database,
//!   size/{width,height,depth}, segmented,
//!   object* { name, pose, truncated, difficult, bndbox/{xmin,ymin,xmax,ymax} }
//! ```

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::Node;
use serde::Serialize;

use crate::error::VocprepError;
use crate::geometry::BoundingBox;
use crate::raster::discard_partial_file;

pub const VOC_XML_EXTENSION: &str = "xml";
const SOURCE_DATABASE: &str = "Unknown";
const DEFAULT_POSE: &str = "Unspecified";

/// One `<object>` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VocObject {
    pub name: String,
    pub pose: String,
    pub truncated: bool,
    pub difficult: bool,
    pub bbox: BoundingBox,
}

impl VocObject {
    /// An object with the writer's fixed pose/truncated/difficult values.
    pub fn new(name: impl Into<String>, bbox: BoundingBox) -> Self {
        Self {
            name: name.into(),
            pose: DEFAULT_POSE.to_string(),
            truncated: false,
            difficult: false,
            bbox,
        }
    }
}

/// A complete per-image annotation document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VocAnnotation {
    pub folder: String,
    pub filename: String,
    pub path: String,
    pub database: String,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub segmented: bool,
    pub objects: Vec<VocObject>,
}

impl VocAnnotation {
    /// Describe `image_path` with one object per box, all labelled `class_label`.
    ///
    /// Boxes are re-clamped to `width x height` so a document never points
    /// outside its image.
    pub fn for_image(
        image_path: &Path,
        class_label: &str,
        width: u32,
        height: u32,
        depth: u32,
        boxes: &[BoundingBox],
    ) -> Result<Self, VocprepError> {
        let filename = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let absolute = std::path::absolute(image_path).map_err(VocprepError::Io)?;

        let objects = boxes
            .iter()
            .map(|bbox| {
                let clamped = BoundingBox::clamped(
                    i64::from(bbox.xmin),
                    i64::from(bbox.ymin),
                    i64::from(bbox.xmax),
                    i64::from(bbox.ymax),
                    width,
                    height,
                );
                VocObject::new(class_label, clamped)
            })
            .collect();

        Ok(Self {
            folder: class_label.to_string(),
            filename,
            path: absolute.to_string_lossy().into_owned(),
            database: SOURCE_DATABASE.to_string(),
            width,
            height,
            depth,
            segmented: false,
            objects,
        })
    }

    /// Serialize with the fixed tag order.
    pub fn to_xml_string(&self) -> String {
        let mut xml = String::new();

        writeln!(xml, "<?xml version=\"1.0\" encoding=\"utf-8\"?>").expect("write to string");
        writeln!(xml, "<annotation>").expect("write to string");
        writeln!(xml, "  <folder>{}</folder>", xml_escape(&self.folder)).expect("write to string");
        writeln!(xml, "  <filename>{}</filename>", xml_escape(&self.filename))
            .expect("write to string");
        writeln!(xml, "  <path>{}</path>", xml_escape(&self.path)).expect("write to string");
        writeln!(xml, "  <source>").expect("write to string");
        writeln!(xml, "    <database>{}</database>", xml_escape(&self.database))
            .expect("write to string");
        writeln!(xml, "  </source>").expect("write to string");
        writeln!(xml, "  <size>").expect("write to string");
        writeln!(xml, "    <width>{}</width>", self.width).expect("write to string");
        writeln!(xml, "    <height>{}</height>", self.height).expect("write to string");
        writeln!(xml, "    <depth>{}</depth>", self.depth).expect("write to string");
        writeln!(xml, "  </size>").expect("write to string");
        writeln!(xml, "  <segmented>{}</segmented>", u8::from(self.segmented))
            .expect("write to string");

        for object in &self.objects {
            writeln!(xml, "  <object>").expect("write to string");
            writeln!(xml, "    <name>{}</name>", xml_escape(&object.name)).expect("write to string");
            writeln!(xml, "    <pose>{}</pose>", xml_escape(&object.pose)).expect("write to string");
            writeln!(xml, "    <truncated>{}</truncated>", u8::from(object.truncated))
                .expect("write to string");
            writeln!(xml, "    <difficult>{}</difficult>", u8::from(object.difficult))
                .expect("write to string");
            writeln!(xml, "    <bndbox>").expect("write to string");
            writeln!(xml, "      <xmin>{}</xmin>", object.bbox.xmin).expect("write to string");
            writeln!(xml, "      <ymin>{}</ymin>", object.bbox.ymin).expect("write to string");
            writeln!(xml, "      <xmax>{}</xmax>", object.bbox.xmax).expect("write to string");
            writeln!(xml, "      <ymax>{}</ymax>", object.bbox.ymax).expect("write to string");
            writeln!(xml, "    </bndbox>").expect("write to string");
            writeln!(xml, "  </object>").expect("write to string");
        }

        writeln!(xml, "</annotation>").expect("write to string");
        xml
    }
}

/// Annotation path for a processed image: same stem, `.xml` extension.
pub fn annotation_path_for(image_path: &Path) -> PathBuf {
    image_path.with_extension(VOC_XML_EXTENSION)
}

/// Write `annotation` to `xml_path`.
///
/// Documents without objects are refused; an image with nothing detected is
/// rejected rather than annotated.
pub fn write_voc_annotation(xml_path: &Path, annotation: &VocAnnotation) -> Result<(), VocprepError> {
    if annotation.objects.is_empty() {
        return Err(VocprepError::EmptyAnnotation {
            path: xml_path.to_path_buf(),
        });
    }
    fs::write(xml_path, annotation.to_xml_string()).map_err(|err| {
        discard_partial_file(xml_path);
        VocprepError::Io(err)
    })
}

/// Read an annotation document back from disk.
pub fn read_voc_annotation(xml_path: &Path) -> Result<VocAnnotation, VocprepError> {
    let xml = fs::read_to_string(xml_path).map_err(VocprepError::Io)?;
    parse_voc_annotation_str(&xml, xml_path)
}

/// Parse VOC XML from a UTF-8 string.
pub fn from_voc_xml_str(xml: &str) -> Result<VocAnnotation, VocprepError> {
    parse_voc_annotation_str(xml, Path::new("<memory>"))
}

/// Parse VOC XML from bytes.
///
/// The input must be valid UTF-8.
pub fn from_voc_xml_slice(bytes: &[u8]) -> Result<VocAnnotation, VocprepError> {
    let xml = std::str::from_utf8(bytes).map_err(|source| VocprepError::VocXmlParse {
        path: PathBuf::from("<memory>"),
        message: format!("input is not valid UTF-8: {source}"),
    })?;
    from_voc_xml_str(xml)
}

/// Parse a document; `path` is only used in error messages.
pub fn parse_voc_annotation_str(xml: &str, path: &Path) -> Result<VocAnnotation, VocprepError> {
    let document = roxmltree::Document::parse(xml).map_err(|source| VocprepError::VocXmlParse {
        path: path.to_path_buf(),
        message: source.to_string(),
    })?;

    let annotation = document.root_element();
    if annotation.tag_name().name() != "annotation" {
        return Err(VocprepError::VocXmlParse {
            path: path.to_path_buf(),
            message: "missing <annotation> root element".to_string(),
        });
    }

    let folder = optional_child_text(annotation, "folder").unwrap_or_default();
    let filename = required_child_text(annotation, "filename", path, "<annotation>")?;
    let image_path = optional_child_text(annotation, "path").unwrap_or_default();
    let database = child_element(annotation, "source")
        .and_then(|source| optional_child_text(source, "database"))
        .unwrap_or_default();

    let size = required_child_element(annotation, "size", path, "<annotation>")?;
    let width = parse_required_u32(size, "width", path, "<size>")?;
    let height = parse_required_u32(size, "height", path, "<size>")?;
    let depth = parse_required_u32(size, "depth", path, "<size>")?;
    let segmented = optional_child_text(annotation, "segmented")
        .map(|raw| parse_flag(&raw, "segmented", path))
        .transpose()?
        .unwrap_or(false);

    let mut objects = Vec::new();
    for object in annotation
        .children()
        .filter(|node| node.is_element() && node.tag_name().name() == "object")
    {
        let name = required_child_text(object, "name", path, "<object>")?;
        let pose = optional_child_text(object, "pose").unwrap_or_else(|| DEFAULT_POSE.to_string());
        let truncated = optional_child_text(object, "truncated")
            .map(|raw| parse_flag(&raw, "truncated", path))
            .transpose()?
            .unwrap_or(false);
        let difficult = optional_child_text(object, "difficult")
            .map(|raw| parse_flag(&raw, "difficult", path))
            .transpose()?
            .unwrap_or(false);

        let bndbox = required_child_element(object, "bndbox", path, "<object>")?;
        let xmin = parse_required_u32(bndbox, "xmin", path, "<bndbox>")?;
        let ymin = parse_required_u32(bndbox, "ymin", path, "<bndbox>")?;
        let xmax = parse_required_u32(bndbox, "xmax", path, "<bndbox>")?;
        let ymax = parse_required_u32(bndbox, "ymax", path, "<bndbox>")?;

        objects.push(VocObject {
            name,
            pose,
            truncated,
            difficult,
            bbox: BoundingBox {
                xmin,
                ymin,
                xmax,
                ymax,
            },
        });
    }

    Ok(VocAnnotation {
        folder,
        filename,
        path: image_path,
        database,
        width,
        height,
        depth,
        segmented,
        objects,
    })
}

fn required_child_element<'a, 'input>(
    node: Node<'a, 'input>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<Node<'a, 'input>, VocprepError> {
    child_element(node, tag).ok_or_else(|| VocprepError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!("missing <{tag}> in {context}"),
    })
}

fn required_child_text(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<String, VocprepError> {
    optional_child_text(node, tag).ok_or_else(|| VocprepError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!("missing <{tag}> in {context}"),
    })
}

fn parse_required_u32(
    node: Node<'_, '_>,
    tag: &str,
    path: &Path,
    context: &str,
) -> Result<u32, VocprepError> {
    let raw = required_child_text(node, tag, path, context)?;
    raw.parse::<u32>().map_err(|_| VocprepError::VocXmlParse {
        path: path.to_path_buf(),
        message: format!("invalid <{tag}> value '{raw}' in {context}; expected u32"),
    })
}

fn parse_flag(raw: &str, tag: &str, path: &Path) -> Result<bool, VocprepError> {
    match raw {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(VocprepError::VocXmlParse {
            path: path.to_path_buf(),
            message: format!("invalid <{tag}> value '{other}'; expected 0 or 1"),
        }),
    }
}

fn child_element<'a, 'input>(node: Node<'a, 'input>, tag: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|child| child.is_element() && child.tag_name().name() == tag)
}

fn optional_child_text(node: Node<'_, '_>, tag: &str) -> Option<String> {
    child_element(node, tag)
        .and_then(|child| child.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
