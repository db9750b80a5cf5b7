use bytes::Bytes;
use std::fmt;
use std::net::Ipv4Addr;

/// Maximum encoded length of a domain name: the number of labels plus
/// the sum of the lengths of the labels.
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// Maximum length of a single label in a domain name.
pub const LABEL_MAX_LEN: usize = 63;

/// Octet mask for the QR flag being set (response).
pub const HEADER_MASK_QR: u8 = 0b1000_0000;

/// Octet mask and offset for the OPCODE field.
pub const HEADER_MASK_OPCODE: u8 = 0b0111_1000;
pub const HEADER_OFFSET_OPCODE: u8 = 3;

/// Octet mask for the AA flag.
pub const HEADER_MASK_AA: u8 = 0b0000_0100;

/// Octet mask for the TC flag.
pub const HEADER_MASK_TC: u8 = 0b0000_0010;

/// Octet mask for the RD flag.
pub const HEADER_MASK_RD: u8 = 0b0000_0001;

/// Octet mask for the RA flag.
pub const HEADER_MASK_RA: u8 = 0b1000_0000;

/// Octet mask for the 3-bit reserved Z field.
pub const HEADER_MASK_Z: u8 = 0b0111_0000;
pub const HEADER_OFFSET_Z: u8 = 4;

/// Octet mask for the RCODE field.
pub const HEADER_MASK_RCODE: u8 = 0b0000_1111;

/// A DNS message: a header, a question section, and three resource
/// record sections (answer, authority, additional).
///
/// See section 4.1 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Message {
    /// Build a query message: RD set, one question, no records.
    pub fn query(id: u16, question: Question) -> Self {
        Self {
            header: Header {
                id,
                is_response: false,
                opcode: Opcode::Standard,
                is_authoritative: false,
                is_truncated: false,
                recursion_desired: true,
                recursion_available: false,
                z: 0,
                rcode: Rcode::NoError,
            },
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// The number of resource records across all three sections.
    pub fn record_count(&self) -> usize {
        self.answers.len() + self.authority.len() + self.additional.len()
    }
}

/// Common header for all DNS messages.
///
/// ```text
///                                     1  1  1  1  1  1
///       0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                      ID                       |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    QDCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ANCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    NSCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
///     |                    ARCOUNT                    |
///     +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
///
/// The count fields are not part of this type: they are derived from
/// the lengths of the `Message`'s question/answer/authority/additional
/// vectors during serialisation, and checked during deserialisation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Header {
    pub id: u16,
    pub is_response: bool,
    pub opcode: Opcode,
    pub is_authoritative: bool,
    pub is_truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    /// The reserved Z field. Preserved verbatim on decode; never
    /// consulted for any semantic decision, per RFC 1035 section 4.1.1.
    pub z: u8,
    pub rcode: Rcode,
}

impl Header {
    /// Turn a query header into the header of its response: flips QR,
    /// sets RA, and applies the given response code. `id`, `opcode`,
    /// and `recursion_desired` are carried over unchanged.
    pub fn into_response(self, rcode: Rcode) -> Self {
        Self {
            is_response: true,
            is_authoritative: false,
            is_truncated: false,
            recursion_available: true,
            rcode,
            ..self
        }
    }
}

/// The header fields used only during (de)serialisation: the section
/// counts aren't kept on `Header` because they're redundant with the
/// lengths of the `Message`'s vectors.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct WireHeader {
    pub header: Header,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

/// The 4-bit OPCODE field. Only `Standard` queries are resolved; other
/// opcodes are accepted on the wire (round-trip correctly) but are not
/// otherwise acted on by this resolver.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    Standard,
    Inverse,
    Status,
    Reserved(OpcodeReserved),
}

/// A wrapper ensuring only genuinely-reserved opcode values can be held
/// here, so the enum can't be constructed with e.g. `Opcode::Reserved(0)`.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct OpcodeReserved(u8);

impl From<u8> for Opcode {
    fn from(octet: u8) -> Self {
        match octet & 0b1111 {
            0 => Opcode::Standard,
            1 => Opcode::Inverse,
            2 => Opcode::Status,
            other => Opcode::Reserved(OpcodeReserved(other)),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Standard => 0,
            Opcode::Inverse => 1,
            Opcode::Status => 2,
            Opcode::Reserved(OpcodeReserved(octet)) => octet,
        }
    }
}

/// The 4-bit RCODE field.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Rcode {
    NoError,
    FormatError,
    ServerFailure,
    NameError,
    NotImplemented,
    Refused,
    Reserved(RcodeReserved),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct RcodeReserved(u8);

impl From<u8> for Rcode {
    fn from(octet: u8) -> Self {
        match octet & 0b1111 {
            0 => Rcode::NoError,
            1 => Rcode::FormatError,
            2 => Rcode::ServerFailure,
            3 => Rcode::NameError,
            4 => Rcode::NotImplemented,
            5 => Rcode::Refused,
            other => Rcode::Reserved(RcodeReserved(other)),
        }
    }
}

impl From<Rcode> for u8 {
    fn from(value: Rcode) -> Self {
        match value {
            Rcode::NoError => 0,
            Rcode::FormatError => 1,
            Rcode::ServerFailure => 2,
            Rcode::NameError => 3,
            Rcode::NotImplemented => 4,
            Rcode::Refused => 5,
            Rcode::Reserved(RcodeReserved(octet)) => octet,
        }
    }
}

/// The question section asks about one `(name, type, class)` tuple.
///
/// See section 4.1.2 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Question {
    pub name: DomainName,
    pub qtype: RecordType,
    pub qclass: RecordClass,
}

/// A resource record: a name, a class, a TTL, and type-specific data.
///
/// See section 4.1.3 of RFC 1035.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct ResourceRecord {
    pub name: DomainName,
    pub rclass: RecordClass,
    pub ttl: u32,
    pub data: RecordData,
}

impl ResourceRecord {
    pub fn rtype(&self) -> RecordType {
        self.data.rtype()
    }

    pub fn a(name: DomainName, ttl: u32, address: Ipv4Addr) -> Self {
        Self {
            name,
            rclass: RecordClass::IN,
            ttl,
            data: RecordData::A { address },
        }
    }

    pub fn ns(name: DomainName, ttl: u32, nsdname: DomainName) -> Self {
        Self {
            name,
            rclass: RecordClass::IN,
            ttl,
            data: RecordData::Ns { nsdname },
        }
    }
}

/// The type-tagged RDATA of a resource record.
///
/// This resolver only ever inspects two shapes of record: `A` (to find
/// glue addresses for nameservers) and `NS` (to find referral
/// targets). Everything else is round-tripped as opaque bytes, per the
/// "rdata is opaque" rule: this resolver is not an authoritative
/// server and has no need to understand `CNAME`, `MX`, `TXT`, etc.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub enum RecordData {
    A { address: Ipv4Addr },
    Ns { nsdname: DomainName },
    Other { rtype: RecordType, rdata: Bytes },
}

impl RecordData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordData::A { .. } => RecordType::A,
            RecordData::Ns { .. } => RecordType::NS,
            RecordData::Other { rtype, .. } => *rtype,
        }
    }
}

/// A record type, as used by resource records and questions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordType {
    A,
    NS,
    CNAME,
    SOA,
    PTR,
    MX,
    TXT,
    AAAA,
    Unknown(u16),
}

impl From<u16> for RecordType {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            other => RecordType::Unknown(other),
        }
    }
}

impl From<RecordType> for u16 {
    fn from(value: RecordType) -> Self {
        match value {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::Unknown(tag) => write!(f, "TYPE{tag}"),
        }
    }
}

/// A record class, as used by resource records and questions.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum RecordClass {
    IN,
    Unknown(u16),
}

impl From<u16> for RecordClass {
    fn from(value: u16) -> Self {
        match value {
            1 => RecordClass::IN,
            other => RecordClass::Unknown(other),
        }
    }
}

impl From<RecordClass> for u16 {
    fn from(value: RecordClass) -> Self {
        match value {
            RecordClass::IN => 1,
            RecordClass::Unknown(other) => other,
        }
    }
}

impl fmt::Display for RecordClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::Unknown(tag) => write!(f, "CLASS{tag}"),
        }
    }
}

/// A domain name: an ordered sequence of labels. The root domain has
/// zero labels.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct DomainName {
    pub labels: Vec<Vec<u8>>,
}

impl DomainName {
    pub fn root() -> Self {
        DomainName { labels: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Is `self` equal to, or a descendant of, `other`?
    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        self.labels.ends_with(&other.labels)
    }

    /// Parse a dotted string (no trailing dot) into a `DomainName`.
    ///
    /// # Errors
    ///
    /// If a label is empty, longer than 63 bytes, or the encoded name
    /// would be longer than 255 bytes.
    pub fn from_dotted_string(s: &str) -> Result<Self, DomainNameError> {
        if s.is_empty() {
            return Ok(DomainName::root());
        }

        let mut labels = Vec::new();
        let mut encoded_len = 1; // terminating zero octet
        for part in s.split('.') {
            if part.is_empty() || part.len() > LABEL_MAX_LEN {
                return Err(DomainNameError::InvalidLabel);
            }
            encoded_len += part.len() + 1;
            labels.push(part.as_bytes().to_vec());
        }

        if encoded_len > DOMAINNAME_MAX_LEN {
            return Err(DomainNameError::TooLong);
        }

        Ok(DomainName { labels })
    }

    /// Render as a dotted string with no trailing dot. The root domain
    /// renders as the empty string.
    pub fn to_dotted_string(&self) -> String {
        let mut out = String::new();
        for (i, label) in self.labels.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            for octet in label {
                out.push(*octet as char);
            }
        }
        out
    }

    /// The ASCII-lowercased form of this name, used as a cache key: DNS
    /// names are compared case-insensitively.
    pub fn to_canonical(&self) -> Self {
        DomainName {
            labels: self
                .labels
                .iter()
                .map(|label| label.iter().map(u8::to_ascii_lowercase).collect())
                .collect(),
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted_string())
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, thiserror::Error)]
pub enum DomainNameError {
    #[error("domain label is empty or longer than 63 bytes")]
    InvalidLabel,
    #[error("domain name is longer than 255 bytes when encoded")]
    TooLong,
}
