//! Text encoding of a photo's detections as stored in the photos table.
//!
//! Entries are joined with `;`, fields with `,`:
//! `x1,y1,x2,y2,identity_id,class_label`.

use crate::error::BlobError;

use super::{BoundingBox, Detection};

const ENTRY_SEP: char = ';';
const FIELD_SEP: char = ',';

/// One decoded entry of a detections blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub bbox: BoundingBox,
    pub identity_id: u32,
    pub class_label: String,
}

/// Encode detections using their smoothed class labels.
pub fn encode_detections(detections: &[Detection]) -> String {
    detections
        .iter()
        .map(|d| {
            format!(
                "{},{},{},{},{},{}",
                d.bbox.x1,
                d.bbox.y1,
                d.bbox.x2,
                d.bbox.y2,
                d.identity_id,
                sanitize_label(&d.smoothed_class_label)
            )
        })
        .collect::<Vec<_>>()
        .join(";")
}

pub fn parse_detections(blob: &str) -> Result<Vec<BlobEntry>, BlobError> {
    if blob.is_empty() {
        return Ok(Vec::new());
    }

    blob.split(ENTRY_SEP)
        .enumerate()
        .map(|(index, entry)| parse_entry(index, entry))
        .collect()
}

/// Class of the first entry. Exports use this as the photo's class.
pub fn first_class_label(blob: &str) -> Option<&str> {
    let first = blob.split(ENTRY_SEP).next()?;
    let label = first.splitn(6, FIELD_SEP).nth(5)?;
    (!label.is_empty()).then_some(label)
}

fn parse_entry(index: usize, entry: &str) -> Result<BlobEntry, BlobError> {
    let fields: Vec<&str> = entry.split(FIELD_SEP).collect();
    if fields.len() != 6 {
        return Err(BlobError::FieldCount {
            index,
            found: fields.len(),
        });
    }

    let coord = |i: usize, field: &'static str| -> Result<i32, BlobError> {
        fields[i].trim().parse().map_err(|_| BlobError::InvalidNumber {
            index,
            field,
            value: fields[i].to_string(),
        })
    };

    let identity_id = fields[4]
        .trim()
        .parse()
        .map_err(|_| BlobError::InvalidNumber {
            index,
            field: "identity_id",
            value: fields[4].to_string(),
        })?;

    Ok(BlobEntry {
        bbox: BoundingBox::new(coord(0, "x1")?, coord(1, "y1")?, coord(2, "x2")?, coord(3, "y2")?),
        identity_id,
        class_label: fields[5].to_string(),
    })
}

fn sanitize_label(label: &str) -> String {
    label.replace([ENTRY_SEP, FIELD_SEP], "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(bbox: (i32, i32, i32, i32), id: u32, label: &str) -> Detection {
        Detection {
            bbox: BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
            raw_class_label: "raw".to_string(),
            smoothed_class_label: label.to_string(),
            identity_id: id,
        }
    }

    #[test]
    fn test_encode_format() {
        let blob = encode_detections(&[
            detection((10, 20, 110, 220), 1, "fox"),
            detection((300, 40, 380, 90), 2, "animal"),
        ]);
        assert_eq!(blob, "10,20,110,220,1,fox;300,40,380,90,2,animal");
    }

    #[test]
    fn test_parse_returns_what_was_encoded() {
        let detections = vec![
            detection((0, 0, 5, 5), 1, "deer"),
            detection((-3, 7, 1920, 1080), 4, "red deer"),
        ];
        let parsed = parse_detections(&encode_detections(&detections)).unwrap();

        assert_eq!(parsed.len(), 2);
        for (entry, original) in parsed.iter().zip(&detections) {
            assert_eq!(entry.bbox, original.bbox);
            assert_eq!(entry.identity_id, original.identity_id);
            assert_eq!(entry.class_label, original.smoothed_class_label);
        }
    }

    #[test]
    fn test_empty_blob() {
        assert_eq!(encode_detections(&[]), "");
        assert!(parse_detections("").unwrap().is_empty());
        assert_eq!(first_class_label(""), None);
    }

    #[test]
    fn test_separators_in_labels_are_replaced() {
        let blob = encode_detections(&[detection((1, 2, 3, 4), 1, "cat;dog,bird")]);
        assert_eq!(blob, "1,2,3,4,1,cat_dog_bird");
        assert_eq!(parse_detections(&blob).unwrap()[0].class_label, "cat_dog_bird");
    }

    #[test]
    fn test_first_class_label() {
        assert_eq!(first_class_label("1,2,3,4,1,fox;5,6,7,8,2,badger"), Some("fox"));
        assert_eq!(first_class_label("1,2,3"), None);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse_detections("1,2,3,4,1"),
            Err(BlobError::FieldCount { index: 0, found: 5 })
        );
        assert_eq!(
            parse_detections("1,2,3,4,1,fox;a,2,3,4,2,fox"),
            Err(BlobError::InvalidNumber {
                index: 1,
                field: "x1",
                value: "a".to_string()
            })
        );
    }
}
