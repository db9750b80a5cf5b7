use bytes::Bytes;

use super::types::{
    DomainName, Header, Message, Opcode, Question, Rcode, RecordClass, RecordData, RecordType,
    ResourceRecord, DOMAINNAME_MAX_LEN, HEADER_MASK_AA, HEADER_MASK_OPCODE, HEADER_MASK_QR,
    HEADER_MASK_RA, HEADER_MASK_RCODE, HEADER_MASK_RD, HEADER_MASK_TC, HEADER_MASK_Z,
    HEADER_OFFSET_OPCODE, HEADER_OFFSET_Z, LABEL_MAX_LEN,
};

/// Errors that can occur while decoding a message from the wire.
///
/// None of these carry the message ID: a message too mangled to
/// finish decoding is simply dropped by the admission layer, which
/// logs the raw source address instead of trying to build a matching
/// error response.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("message is shorter than a DNS header")]
    HeaderTooShort,
    #[error("question section is truncated")]
    QuestionTooShort,
    #[error("resource record section is truncated")]
    ResourceRecordTooShort,
    #[error("resource record RDLENGTH does not match the remaining rdata")]
    ResourceRecordInvalid,
    #[error("domain name is truncated")]
    DomainTooShort,
    #[error("domain name is longer than 255 bytes")]
    DomainTooLong,
    #[error("domain name compression pointer does not point strictly backwards")]
    DomainPointerInvalid,
    #[error("domain name label has an invalid length octet")]
    DomainLabelInvalid,
}

/// A cursor over a byte slice, with support for jumping to an
/// arbitrary offset and coming back: this is what makes domain name
/// compression pointers decodable, since a pointer's target is
/// resolved against the same underlying buffer as the rest of the
/// message.
#[derive(Debug, Copy, Clone)]
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        ConsumableBuffer { octets, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// A cursor over the same underlying buffer, repositioned to
    /// `position`. Used to follow compression pointers.
    pub fn at_offset(&self, position: usize) -> Self {
        ConsumableBuffer {
            octets: self.octets,
            position,
        }
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        let octet = *self.octets.get(self.position)?;
        self.position += 1;
        Some(octet)
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        let hi = self.next_u8()?;
        let lo = self.next_u8()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        let b0 = self.next_u8()?;
        let b1 = self.next_u8()?;
        let b2 = self.next_u8()?;
        let b3 = self.next_u8()?;
        Some(u32::from_be_bytes([b0, b1, b2, b3]))
    }

    pub fn take(&mut self, size: usize) -> Option<&'a [u8]> {
        let slice = self.octets.get(self.position..self.position + size)?;
        self.position += size;
        Some(slice)
    }
}

impl Message {
    /// Decode a message from its wire representation.
    ///
    /// # Errors
    ///
    /// If the message is too short, or any section is malformed.
    pub fn from_octets(octets: &[u8]) -> Result<Self, DecodeError> {
        let mut buffer = ConsumableBuffer::new(octets);

        let wire_header = WireHeader::deserialise(&mut buffer)?;

        let mut questions = Vec::with_capacity(wire_header.qdcount as usize);
        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(&mut buffer)?);
        }

        let mut answers = Vec::with_capacity(wire_header.ancount as usize);
        for _ in 0..wire_header.ancount {
            answers.push(ResourceRecord::deserialise(&mut buffer)?);
        }

        let mut authority = Vec::with_capacity(wire_header.nscount as usize);
        for _ in 0..wire_header.nscount {
            authority.push(ResourceRecord::deserialise(&mut buffer)?);
        }

        let mut additional = Vec::with_capacity(wire_header.arcount as usize);
        for _ in 0..wire_header.arcount {
            additional.push(ResourceRecord::deserialise(&mut buffer)?);
        }

        Ok(Message {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

struct WireHeader {
    header: Header,
    qdcount: u16,
    ancount: u16,
    nscount: u16,
    arcount: u16,
}

impl WireHeader {
    fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        let id = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;
        let flags1 = buffer.next_u8().ok_or(DecodeError::HeaderTooShort)?;
        let flags2 = buffer.next_u8().ok_or(DecodeError::HeaderTooShort)?;
        let qdcount = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;
        let ancount = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;
        let nscount = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;
        let arcount = buffer.next_u16().ok_or(DecodeError::HeaderTooShort)?;

        let header = Header {
            id,
            is_response: flags1 & HEADER_MASK_QR != 0,
            opcode: Opcode::from((flags1 & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE),
            is_authoritative: flags1 & HEADER_MASK_AA != 0,
            is_truncated: flags1 & HEADER_MASK_TC != 0,
            recursion_desired: flags1 & HEADER_MASK_RD != 0,
            recursion_available: flags2 & HEADER_MASK_RA != 0,
            z: (flags2 & HEADER_MASK_Z) >> HEADER_OFFSET_Z,
            rcode: Rcode::from(flags2 & HEADER_MASK_RCODE),
        };

        Ok(WireHeader {
            header,
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

impl Question {
    fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        let name = DomainName::deserialise(buffer)?;
        let qtype = RecordType::from(buffer.next_u16().ok_or(DecodeError::QuestionTooShort)?);
        let qclass = RecordClass::from(buffer.next_u16().ok_or(DecodeError::QuestionTooShort)?);
        Ok(Question { name, qtype, qclass })
    }
}

impl ResourceRecord {
    fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        let name = DomainName::deserialise(buffer)?;
        let rtype = RecordType::from(
            buffer.next_u16().ok_or(DecodeError::ResourceRecordTooShort)?,
        );
        let rclass = RecordClass::from(
            buffer.next_u16().ok_or(DecodeError::ResourceRecordTooShort)?,
        );
        let ttl = buffer.next_u32().ok_or(DecodeError::ResourceRecordTooShort)?;
        let rdlength = buffer.next_u16().ok_or(DecodeError::ResourceRecordTooShort)?;

        let rdata_start = buffer.position();
        let data = match rtype {
            RecordType::A => {
                let octets = buffer
                    .take(usize::from(rdlength))
                    .ok_or(DecodeError::ResourceRecordTooShort)?;
                if octets.len() != 4 {
                    return Err(DecodeError::ResourceRecordInvalid);
                }
                RecordData::A {
                    address: std::net::Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
                }
            }
            RecordType::NS => {
                let nsdname = DomainName::deserialise(buffer)?;
                if buffer.position() != rdata_start + usize::from(rdlength) {
                    return Err(DecodeError::ResourceRecordInvalid);
                }
                RecordData::Ns { nsdname }
            }
            other => {
                let rdata = buffer
                    .take(usize::from(rdlength))
                    .ok_or(DecodeError::ResourceRecordTooShort)?;
                RecordData::Other {
                    rtype: other,
                    rdata: Bytes::copy_from_slice(rdata),
                }
            }
        };

        Ok(ResourceRecord {
            name,
            rclass,
            ttl,
            data,
        })
    }
}

impl DomainName {
    /// Decode a domain name, following at most one level of compression
    /// pointer per recursive step. A pointer's target must be strictly
    /// before the start of the name currently being decoded: since
    /// each recursive call re-anchors `start` to its own entry
    /// position, a pointer chain is forced to strictly decrease, which
    /// rules out pointer cycles and guarantees termination.
    pub(super) fn deserialise(buffer: &mut ConsumableBuffer) -> Result<Self, DecodeError> {
        let start = buffer.position();
        let mut labels = Vec::new();

        loop {
            let size = buffer.next_u8().ok_or(DecodeError::DomainTooShort)?;

            if size == 0 {
                break;
            } else if usize::from(size) <= LABEL_MAX_LEN {
                let label = buffer
                    .take(usize::from(size))
                    .ok_or(DecodeError::DomainTooShort)?;
                labels.push(label.to_vec());
            } else if size & 0b1100_0000 == 0b1100_0000 {
                let hi = size & 0b0011_1111;
                let lo = buffer.next_u8().ok_or(DecodeError::DomainTooShort)?;
                let ptr = usize::from(u16::from_be_bytes([hi, lo]));

                if ptr >= start {
                    return Err(DecodeError::DomainPointerInvalid);
                }

                let mut pointee = buffer.at_offset(ptr);
                let suffix = DomainName::deserialise(&mut pointee)?;
                labels.extend(suffix.labels);
                break;
            } else {
                return Err(DecodeError::DomainLabelInvalid);
            }
        }

        let encoded_len: usize = labels.iter().map(|label| label.len() + 1).sum::<usize>() + 1;
        if encoded_len > DOMAINNAME_MAX_LEN {
            return Err(DecodeError::DomainTooLong);
        }

        Ok(DomainName { labels })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Question, RecordClass, RecordType};

    fn domain(dotted: &str) -> DomainName {
        DomainName::from_dotted_string(dotted).unwrap()
    }

    #[test]
    fn round_trips_a_query_message() {
        let message = Message::query(
            1234,
            Question {
                name: domain("www.example.com"),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        );

        let octets = message.to_octets();
        let decoded = Message::from_octets(&octets).unwrap();

        assert_eq!(message, decoded);
    }

    #[test]
    fn round_trips_an_ns_record_with_no_compression() {
        let rr = ResourceRecord::ns(domain("example.com"), 3600, domain("ns1.example.com"));
        let mut message = Message::query(
            1,
            Question {
                name: domain("example.com"),
                qtype: RecordType::NS,
                qclass: RecordClass::IN,
            },
        );
        message.answers.push(rr);

        let octets = message.to_octets();
        let decoded = Message::from_octets(&octets).unwrap();

        assert_eq!(message, decoded);
    }

    #[test]
    fn follows_a_backward_compression_pointer() {
        // "ns1" label, then a pointer back to offset 0, where the
        // question's "example.com" name lives.
        let mut question_buf = bytes::BytesMut::new();
        domain("example.com").serialise(&mut question_buf);

        let mut buffer = question_buf.to_vec();
        let ns1_offset = buffer.len();
        buffer.push(3);
        buffer.extend_from_slice(b"ns1");
        buffer.push(0b1100_0000);
        buffer.push(0);

        let mut cursor = ConsumableBuffer::new(&buffer).at_offset(ns1_offset);
        let name = DomainName::deserialise(&mut cursor).unwrap();

        assert_eq!(name, domain("ns1.example.com"));
    }

    #[test]
    fn rejects_a_pointer_that_does_not_point_strictly_backwards() {
        let mut buffer = vec![0b1100_0000, 0];
        // Point at itself: not strictly backwards.
        buffer[1] = 0;

        let mut cursor = ConsumableBuffer::new(&buffer);
        let err = DomainName::deserialise(&mut cursor).unwrap_err();

        assert_eq!(err, DecodeError::DomainPointerInvalid);
    }

    #[test]
    fn rejects_a_forward_pointing_pointer() {
        // Two names: the first points forward into the second, which
        // is invalid regardless of what the second name contains.
        let buffer = vec![0b1100_0000, 4, 0, 0];
        let mut cursor = ConsumableBuffer::new(&buffer);
        let err = DomainName::deserialise(&mut cursor).unwrap_err();

        assert_eq!(err, DecodeError::DomainPointerInvalid);
    }

    #[test]
    fn rejects_a_header_shorter_than_twelve_bytes() {
        let too_short = [0u8; 4];
        let err = Message::from_octets(&too_short).unwrap_err();
        assert_eq!(err, DecodeError::HeaderTooShort);
    }

    #[test]
    fn preserves_reserved_header_bits_and_flags() {
        let mut message = Message::query(
            42,
            Question {
                name: domain("example.com"),
                qtype: RecordType::A,
                qclass: RecordClass::IN,
            },
        );
        message.header.z = 0b101;
        message.header.is_truncated = true;

        let decoded = Message::from_octets(&message.to_octets()).unwrap();

        assert_eq!(decoded.header.z, 0b101);
        assert!(decoded.header.is_truncated);
    }
}
