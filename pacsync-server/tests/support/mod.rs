//! Shared helpers for the integration tests.

use dicom_core::{DataElement, VR, dicom_value};
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use std::path::{Path, PathBuf};

pub const SC_SOP_CLASS: &str = "1.2.840.10008.5.1.4.1.1.7";

/// Serialize a minimal secondary-capture object to `path`.
pub fn write_object(path: &Path, study: &str, series: &str, sop: &str) {
    std::fs::write(path, object_bytes(study, series, sop)).unwrap();
}

/// A minimal secondary-capture object as encapsulated file bytes, usable as
/// a fixture payload or a local store entry.
pub fn object_bytes(study: &str, series: &str, sop: &str) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let staged: PathBuf = dir.path().join("object.dcm");

    let mut object = InMemDicomObject::new_empty();
    object.put(DataElement::new(
        tags::SOP_CLASS_UID,
        VR::UI,
        dicom_value!(Str, SC_SOP_CLASS),
    ));
    object.put(DataElement::new(
        tags::SOP_INSTANCE_UID,
        VR::UI,
        dicom_value!(Str, sop),
    ));
    object.put(DataElement::new(
        tags::STUDY_INSTANCE_UID,
        VR::UI,
        dicom_value!(Str, study),
    ));
    object.put(DataElement::new(
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        dicom_value!(Str, series),
    ));
    object.put(DataElement::new(
        tags::MODALITY,
        VR::CS,
        dicom_value!(Str, "OT"),
    ));
    let file_object = object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax("1.2.840.10008.1.2.1")
                .media_storage_sop_class_uid(SC_SOP_CLASS)
                .media_storage_sop_instance_uid(sop),
        )
        .unwrap();
    file_object.write_to_file(&staged).unwrap();
    std::fs::read(&staged).unwrap()
}
