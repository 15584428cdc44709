use pacsync_model::{SeriesUid, SopInstanceUid, StudyUid};
use std::fmt;

/// Response status at the granularity this crate models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DimseStatus {
    Success,
    /// Failure with the protocol status code reported by the peer.
    Failure(u16),
}

impl DimseStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, DimseStatus::Success)
    }
}

impl fmt::Display for DimseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DimseStatus::Success => write!(f, "success"),
            DimseStatus::Failure(code) => write!(f, "failure ({code:#06x})"),
        }
    }
}

/// Retrieval priority tag carried on move requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectResult {
    Permanent,
    Transient,
}

impl fmt::Display for RejectResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectResult::Permanent => write!(f, "permanent"),
            RejectResult::Transient => write!(f, "transient"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectSource {
    ServiceUser,
    ServiceProvider,
}

impl fmt::Display for RejectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectSource::ServiceUser => write!(f, "service user"),
            RejectSource::ServiceProvider => write!(f, "service provider"),
        }
    }
}

impl std::error::Error for RejectSource {}

/// Association rejection reasons. The called/calling identity mismatches
/// are deliberately distinct so an operator can tell which side of the
/// identity check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    CalledAeNotRecognized,
    CallingAeNotRecognized,
    ApplicationContextNotSupported,
    NoReasonGiven,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::CalledAeNotRecognized => write!(f, "called AE title not recognized"),
            RejectReason::CallingAeNotRecognized => write!(f, "calling AE title not recognized"),
            RejectReason::ApplicationContextNotSupported => {
                write!(f, "application context not supported")
            }
            RejectReason::NoReasonGiven => write!(f, "no reason given"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortSource {
    ServiceUser,
    ServiceProvider,
}

impl fmt::Display for AbortSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortSource::ServiceUser => write!(f, "service user"),
            AbortSource::ServiceProvider => write!(f, "service provider"),
        }
    }
}

impl std::error::Error for AbortSource {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    NotSpecified,
    UnexpectedPdu,
    InvalidPduParameter,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::NotSpecified => write!(f, "not specified"),
            AbortReason::UnexpectedPdu => write!(f, "unexpected PDU"),
            AbortReason::InvalidPduParameter => write!(f, "invalid PDU parameter"),
        }
    }
}

/// A transfer syntax known to this system, with the property negotiation
/// policy actually cares about: whether it is lossy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransferSyntax {
    uid: &'static str,
    name: &'static str,
    lossy: bool,
}

impl TransferSyntax {
    pub const fn uid(&self) -> &'static str {
        self.uid
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub const fn is_lossy(&self) -> bool {
        self.lossy
    }
}

impl fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uid)
    }
}

pub const IMPLICIT_VR_LE: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2",
    name: "Implicit VR Little Endian",
    lossy: false,
};
pub const EXPLICIT_VR_LE: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.1",
    name: "Explicit VR Little Endian",
    lossy: false,
};
pub const DEFLATED_EXPLICIT_VR_LE: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.1.99",
    name: "Deflated Explicit VR Little Endian",
    lossy: false,
};
pub const EXPLICIT_VR_BE: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.2",
    name: "Explicit VR Big Endian",
    lossy: false,
};
pub const JPEG_BASELINE: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.4.50",
    name: "JPEG Baseline (Process 1)",
    lossy: true,
};
pub const JPEG_EXTENDED: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.4.51",
    name: "JPEG Extended (Process 2 & 4)",
    lossy: true,
};
pub const JPEG_LOSSLESS: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.4.57",
    name: "JPEG Lossless (Process 14)",
    lossy: false,
};
pub const JPEG_LOSSLESS_SV1: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.4.70",
    name: "JPEG Lossless SV1 (Process 14)",
    lossy: false,
};
pub const JPEG_LS_LOSSLESS: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.4.80",
    name: "JPEG-LS Lossless",
    lossy: false,
};
pub const JPEG_LS_NEAR_LOSSLESS: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.4.81",
    name: "JPEG-LS Near-Lossless",
    lossy: true,
};
pub const JPEG_2000_LOSSLESS: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.4.90",
    name: "JPEG 2000 Lossless Only",
    lossy: false,
};
pub const JPEG_2000: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.4.91",
    name: "JPEG 2000",
    lossy: true,
};
pub const RLE_LOSSLESS: TransferSyntax = TransferSyntax {
    uid: "1.2.840.10008.1.2.5",
    name: "RLE Lossless",
    lossy: false,
};

/// Every transfer syntax this system knows, in registry order.
pub const KNOWN_TRANSFER_SYNTAXES: &[TransferSyntax] = &[
    IMPLICIT_VR_LE,
    EXPLICIT_VR_LE,
    DEFLATED_EXPLICIT_VR_LE,
    EXPLICIT_VR_BE,
    JPEG_BASELINE,
    JPEG_EXTENDED,
    JPEG_LOSSLESS,
    JPEG_LOSSLESS_SV1,
    JPEG_LS_LOSSLESS,
    JPEG_LS_NEAR_LOSSLESS,
    JPEG_2000_LOSSLESS,
    JPEG_2000,
    RLE_LOSSLESS,
];

/// The small fixed set offered for verification contexts.
pub const UNCOMPRESSED_TRANSFER_SYNTAXES: &[TransferSyntax] =
    &[EXPLICIT_VR_LE, EXPLICIT_VR_BE, IMPLICIT_VR_LE];

/// All known transfer syntaxes with every lossless entry ahead of every
/// lossy one (relative order otherwise preserved), so that when a peer
/// offers a choice the lossless encoding wins the negotiation.
pub fn lossless_first() -> Vec<TransferSyntax> {
    let mut ordered: Vec<TransferSyntax> = KNOWN_TRANSFER_SYNTAXES.to_vec();
    ordered.sort_by_key(|ts| ts.is_lossy());
    ordered
}

pub fn transfer_syntax_by_uid(uid: &str) -> Option<TransferSyntax> {
    KNOWN_TRANSFER_SYNTAXES.iter().find(|ts| ts.uid() == uid).copied()
}

/// Service class proposed on a presentation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbstractSyntax {
    Verification,
    /// A composite object storage class, by SOP class UID.
    Storage(String),
    Other(String),
}

impl fmt::Display for AbstractSyntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractSyntax::Verification => write!(f, "verification"),
            AbstractSyntax::Storage(uid) => write!(f, "storage ({uid})"),
            AbstractSyntax::Other(uid) => write!(f, "other ({uid})"),
        }
    }
}

/// One presentation context as proposed by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedContext {
    pub id: u8,
    pub abstract_syntax: AbstractSyntax,
    /// Transfer syntax UIDs offered by the peer, in its preference order.
    pub transfer_syntaxes: Vec<String>,
}

/// Outcome of negotiating one proposed context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextResult {
    /// Accepted with the selected transfer syntax UID.
    Accepted(String),
    AbstractSyntaxNotSupported,
    TransferSyntaxesNotSupported,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiatedContext {
    pub id: u8,
    pub result: ContextResult,
}

/// One remote study in the query window, as streamed back by the directory
/// query. `instance_count` is the remote-reported related-instance figure,
/// which some vendors omit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStudySummary {
    pub study: StudyUid,
    pub instance_count: Option<u32>,
}

/// One remote series inside a study, from the series-level query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSeriesSummary {
    pub series: SeriesUid,
    pub instance_count: Option<u32>,
}

/// Sub-operation tally reported at the end of a retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MoveReport {
    pub completed: u32,
    pub failed: u32,
    pub warnings: u32,
}

/// Identifier of one stored object as pushed over an inbound association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub sop_class_uid: String,
    pub sop_instance: SopInstanceUid,
    pub payload: Vec<u8>,
}
