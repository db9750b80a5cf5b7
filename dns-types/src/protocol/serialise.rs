use bytes::{BufMut, Bytes, BytesMut};

use super::types::{
    DomainName, Header, Message, Question, RecordData, ResourceRecord, HEADER_MASK_AA,
    HEADER_MASK_OPCODE, HEADER_MASK_QR, HEADER_MASK_RA, HEADER_MASK_RCODE, HEADER_MASK_RD,
    HEADER_MASK_TC, HEADER_MASK_Z, HEADER_OFFSET_OPCODE, HEADER_OFFSET_Z,
};

impl Message {
    /// Serialise this message to the RFC 1035 wire format.
    ///
    /// Domain names are always written out in full: this resolver
    /// never emits compression pointers, only follows them on decode.
    pub fn to_octets(&self) -> Bytes {
        let mut buf = BytesMut::new();

        self.header.serialise(
            &mut buf,
            self.questions.len() as u16,
            self.answers.len() as u16,
            self.authority.len() as u16,
            self.additional.len() as u16,
        );

        for question in &self.questions {
            question.serialise(&mut buf);
        }
        for rr in &self.answers {
            rr.serialise(&mut buf);
        }
        for rr in &self.authority {
            rr.serialise(&mut buf);
        }
        for rr in &self.additional {
            rr.serialise(&mut buf);
        }

        buf.freeze()
    }
}

impl Header {
    fn serialise(&self, buf: &mut BytesMut, qdcount: u16, ancount: u16, nscount: u16, arcount: u16) {
        buf.put_u16(self.id);

        let mut flags1 = 0u8;
        if self.is_response {
            flags1 |= HEADER_MASK_QR;
        }
        flags1 |= (u8::from(self.opcode) << HEADER_OFFSET_OPCODE) & HEADER_MASK_OPCODE;
        if self.is_authoritative {
            flags1 |= HEADER_MASK_AA;
        }
        if self.is_truncated {
            flags1 |= HEADER_MASK_TC;
        }
        if self.recursion_desired {
            flags1 |= HEADER_MASK_RD;
        }
        buf.put_u8(flags1);

        let mut flags2 = 0u8;
        if self.recursion_available {
            flags2 |= HEADER_MASK_RA;
        }
        flags2 |= (self.z << HEADER_OFFSET_Z) & HEADER_MASK_Z;
        flags2 |= u8::from(self.rcode) & HEADER_MASK_RCODE;
        buf.put_u8(flags2);

        buf.put_u16(qdcount);
        buf.put_u16(ancount);
        buf.put_u16(nscount);
        buf.put_u16(arcount);
    }
}

impl Question {
    fn serialise(&self, buf: &mut BytesMut) {
        self.name.serialise(buf);
        buf.put_u16(self.qtype.into());
        buf.put_u16(self.qclass.into());
    }
}

impl ResourceRecord {
    fn serialise(&self, buf: &mut BytesMut) {
        self.name.serialise(buf);
        buf.put_u16(self.rtype().into());
        buf.put_u16(self.rclass.into());
        buf.put_u32(self.ttl);

        match &self.data {
            RecordData::A { address } => {
                buf.put_u16(4);
                buf.put_slice(&address.octets());
            }
            RecordData::Ns { nsdname } => {
                let mut name_buf = BytesMut::new();
                nsdname.serialise(&mut name_buf);
                buf.put_u16(name_buf.len() as u16);
                buf.put_slice(&name_buf);
            }
            RecordData::Other { rdata, .. } => {
                buf.put_u16(rdata.len() as u16);
                buf.put_slice(rdata);
            }
        }
    }
}

impl DomainName {
    pub(super) fn serialise(&self, buf: &mut BytesMut) {
        for label in &self.labels {
            buf.put_u8(label.len() as u8);
            buf.put_slice(label);
        }
        buf.put_u8(0);
    }
}
