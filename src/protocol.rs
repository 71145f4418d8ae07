use byteorder::{NetworkEndian, ReadBytesExt};
use bytes::{BufMut, Bytes};
use enum_primitive_derive::Primitive;
use itertools::Itertools;
use modular_bitfield::{bitfield, prelude::*};
use num_traits::FromPrimitive;
use std::{
    fmt,
    hash::{Hash, Hasher},
    io::{self, Cursor, Read},
    net::Ipv4Addr,
    str::FromStr,
};
use thiserror::Error;
use tracing::trace;

pub const MAX_PACKET_SIZE: usize = 512;

pub const HEADER_SIZE: usize = 12;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;

const CLASS_IN: u16 = 1;

pub type ID = u16;

/// Transaction ID carried by every query sent upstream.
pub const UPSTREAM_QUERY_ID: ID = 0xAAAA;

/// Pointer to offset 12, where the question name of every message starts.
pub const QUESTION_NAME_POINTER: [u8; 2] = [0xC0, 0x0C];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("message truncated")]
    Truncated,
    #[error("label of {0} bytes is longer than 63")]
    LabelTooLong(usize),
    #[error("empty label inside a name")]
    EmptyLabel,
    #[error("name is longer than 255 bytes")]
    NameTooLong,
    #[error("compression pointer in question name")]
    CompressedQuestion,
    #[error("label is not valid UTF-8 or contains a dot")]
    InvalidLabel,
    #[error("invalid {rtype} rdata of {len} bytes")]
    InvalidRdata { rtype: RecordType, len: usize },
}

// Cursor reads can only fail by running off the end of the buffer
impl From<io::Error> for WireError {
    fn from(_: io::Error) -> Self {
        WireError::Truncated
    }
}

/*
https://datatracker.ietf.org/doc/html/rfc1035#section-3.1

<domain-name> is a domain name represented as a series of labels, and
terminated by a label with zero length.

Each label is represented as a one octet length field followed by that
number of octets. Since every domain name ends with the null label of
the root, a domain name is terminated by a length byte of zero.  The
high order two bits of every length octet must be zero, and the
remaining six bits of the length field limit the label to 63 octets or
less.
 */
/// A domain name as the sequence of its labels, without the terminating root label.
///
/// Comparison and hashing are ASCII case-insensitive, the original casing is kept so
/// it can be echoed back in responses.
#[derive(Clone, Debug, Default)]
pub struct DomainName {
    labels: Vec<String>,
}

impl DomainName {
    pub fn root() -> DomainName {
        DomainName { labels: Vec::new() }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Dot-joined lowercase form, used as the cache key and persisted origin.
    pub fn key(&self) -> String {
        self.labels.iter().map(|l| l.to_ascii_lowercase()).join(".")
    }

    fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(&other.labels)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for DomainName {}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_usize(self.labels.len());
        for label in &self.labels {
            state.write_usize(label.len());
            for b in label.bytes() {
                state.write_u8(b.to_ascii_lowercase());
            }
        }
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str(".")
        } else {
            f.write_str(&self.labels.join("."))
        }
    }
}

impl FromStr for DomainName {
    type Err = WireError;

    fn from_str(s: &str) -> Result<DomainName, WireError> {
        let s = s.strip_suffix('.').unwrap_or(s);
        if s.is_empty() {
            return Ok(DomainName::root());
        }

        let mut labels = Vec::new();
        for label in s.split('.') {
            if label.is_empty() {
                return Err(WireError::EmptyLabel);
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(WireError::LabelTooLong(label.len()));
            }
            labels.push(label.to_owned());
        }

        let name = DomainName { labels };
        if name.wire_len() > MAX_NAME_LEN {
            return Err(WireError::NameTooLong);
        }
        Ok(name)
    }
}

fn read_name(cursor: &mut Cursor<&[u8]>) -> Result<DomainName, WireError> {
    let mut labels = Vec::new();
    let mut total_len = 0usize;

    loop {
        let len = cursor.read_u8()? as usize;
        total_len += 1;

        if len & 0b1100_0000 == 0b1100_0000 {
            return Err(WireError::CompressedQuestion);
        }
        if len > MAX_LABEL_LEN {
            return Err(WireError::LabelTooLong(len));
        }
        if len == 0 {
            return Ok(DomainName { labels });
        }

        total_len += len;
        if total_len > MAX_NAME_LEN {
            return Err(WireError::NameTooLong);
        }

        let mut buf = [0u8; MAX_LABEL_LEN];
        cursor.read_exact(&mut buf[0..len])?;
        let label = std::str::from_utf8(&buf[0..len]).map_err(|_| WireError::InvalidLabel)?;
        // A dot inside a label would make the name collide with a different one once joined
        if label.contains('.') {
            return Err(WireError::InvalidLabel);
        }

        labels.push(label.to_owned());
    }
}

// Answer owner names are not parsed, only stepped over. Upstream servers compress them to
// a pointer, but a plain label sequence is skipped as well.
fn skip_name(cursor: &mut Cursor<&[u8]>) -> Result<(), WireError> {
    loop {
        let octet = cursor.read_u8()?;
        match octet & 0b1100_0000 {
            0b1100_0000 => {
                cursor.read_u8()?;
                return Ok(());
            }
            0b0000_0000 if octet == 0 => return Ok(()),
            0b0000_0000 => {
                take_slice(cursor, octet.into())?;
            }
            _ => return Err(WireError::LabelTooLong(octet.into())),
        }
    }
}

fn write_name<B: BufMut>(name: &DomainName, buf: &mut B) -> Result<(), WireError> {
    if name.wire_len() > MAX_NAME_LEN {
        return Err(WireError::NameTooLong);
    }

    for label in name.labels() {
        let bytes = label.as_bytes();

        if bytes.is_empty() {
            return Err(WireError::EmptyLabel);
        }
        if bytes.len() > MAX_LABEL_LEN {
            return Err(WireError::LabelTooLong(bytes.len()));
        }

        buf.put_u8(bytes.len() as u8);
        buf.put_slice(bytes);
    }

    buf.put_u8(0);
    Ok(())
}

fn take_slice<'a>(cursor: &mut Cursor<&'a [u8]>, size: usize) -> Result<&'a [u8], WireError> {
    let bytes: &'a [u8] = *cursor.get_ref();
    let start = cursor.position() as usize;
    let end = start.checked_add(size).ok_or(WireError::Truncated)?;
    let slice = bytes.get(start..end).ok_or(WireError::Truncated)?;
    cursor.set_position(end as u64);
    Ok(slice)
}

/* Header section

                                1  1  1  1  1  1
  0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                      ID                       |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    QDCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    ANCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    NSCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                    ARCOUNT                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
*/
#[derive(Clone, Copy, Debug)]
pub struct Header {
    pub id: ID,
    pub flags: HeaderFlags,
    pub question_count: u16,
    pub answer_count: u16,
    pub authority_count: u16,
    pub additional_count: u16,
}

// Opcode and rcode are kept as raw bits so unknown values pass through untouched
#[bitfield(bits = 16)]
#[repr(u16)]
#[derive(Clone, Copy, Debug)]
pub struct HeaderFlags {
    pub rcode: B4,
    pub z: B3,
    pub ra: bool,
    pub rd: bool,
    pub tc: bool,
    pub aa: bool,
    pub opcode: B4,
    pub qr: bool,
}

impl Header {
    pub fn new(id: ID, flags: HeaderFlags) -> Header {
        Header {
            id,
            flags,
            question_count: 0,
            answer_count: 0,
            authority_count: 0,
            additional_count: 0,
        }
    }

    pub fn read_from(cursor: &mut Cursor<&[u8]>) -> Result<Header, WireError> {
        let id = cursor.read_u16::<NetworkEndian>()?;
        let flags = HeaderFlags::from(cursor.read_u16::<NetworkEndian>()?);
        let qdcount = cursor.read_u16::<NetworkEndian>()?;
        let ancount = cursor.read_u16::<NetworkEndian>()?;
        let nscount = cursor.read_u16::<NetworkEndian>()?;
        let arcount = cursor.read_u16::<NetworkEndian>()?;

        trace!(
            id,
            ?flags,
            qdcount,
            ancount,
            nscount,
            arcount,
            "Header::read_from"
        );

        Ok(Header {
            id,
            flags,
            question_count: qdcount,
            answer_count: ancount,
            authority_count: nscount,
            additional_count: arcount,
        })
    }

    pub fn write_to<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16(self.id);
        buf.put_u16(self.flags.into());
        buf.put_u16(self.question_count);
        buf.put_u16(self.answer_count);
        buf.put_u16(self.authority_count);
        buf.put_u16(self.additional_count);
    }
}

// https://datatracker.ietf.org/doc/html/rfc1035#section-3.2.2
// Only used to name the types this server recognizes but does not resolve.
#[derive(Copy, Clone, Debug, Primitive, PartialEq, Eq)]
enum QuestionType {
    A = 1,      // host address, IPv4
    NS = 2,     // authoritative name server
    CNAME = 5,  // the canonical name for an alias
    SOA = 6,    // marks the start of a zone of authority
    PTR = 12,   // domain name pointer
    HINFO = 13, // host information
    MX = 15,    // mail exchange
    TXT = 16,   // text strings
    AAAA = 28,  // host address, IPv6
    SRV = 33,   // service locator
    OPT = 41,   // pseudo-RR
    AXFR = 252, // request for a transfer of an entire zone
    ALL = 255,  // aka "*", request for all records
}

/// Type of a question or resource record, by its wire code. Only types with an entry in
/// the codec registry can be resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordType(u16);

impl RecordType {
    pub const A: RecordType = RecordType(1);
    pub const NS: RecordType = RecordType(2);

    pub fn code(self) -> u16 {
        self.0
    }

    pub fn is_supported(self) -> bool {
        codec(self).is_some()
    }
}

impl From<u16> for RecordType {
    fn from(code: u16) -> Self {
        RecordType(code)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match QuestionType::from_u16(self.code()) {
            Some(known) => write!(f, "{:?}", known),
            // https://datatracker.ietf.org/doc/html/rfc3597#section-5
            None => write!(f, "TYPE{}", self.code()),
        }
    }
}

/// Payload of a resource record, kept as the RDATA its codec accepted.
///
/// NS data is the raw RDATA as received upstream. Any compression pointers inside it
/// are not resolved and refer to offsets in the upstream message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordData {
    rtype: RecordType,
    rdata: Bytes,
}

impl RecordData {
    pub fn a(address: Ipv4Addr) -> RecordData {
        RecordData {
            rtype: RecordType::A,
            rdata: Bytes::copy_from_slice(&address.octets()),
        }
    }

    pub fn ns(rdata: Bytes) -> RecordData {
        RecordData {
            rtype: RecordType::NS,
            rdata,
        }
    }

    pub fn rtype(&self) -> RecordType {
        self.rtype
    }

    pub fn rdata(&self) -> &Bytes {
        &self.rdata
    }

    /// Text form used by the persisted cache: dotted-decimal for A, base64 for NS.
    pub fn to_text(&self) -> String {
        match codec(self.rtype) {
            Some(codec) => (codec.format)(&self.rdata[..]),
            None => format_base64(&self.rdata[..]),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceRecord {
    pub ttl: u32,
    pub data: RecordData,
}

impl ResourceRecord {
    pub fn rtype(&self) -> RecordType {
        self.data.rtype()
    }
}

/// Every conversion for one resolvable record type. Supporting another type means
/// adding its entry to `CODECS`.
pub struct RecordCodec {
    pub rtype: RecordType,
    /// Key under which records of this type are persisted.
    pub name: &'static str,
    accepts: fn(&[u8]) -> bool,
    format: fn(&[u8]) -> String,
    parse: fn(&str) -> Option<Bytes>,
}

impl RecordCodec {
    /// Checks RDATA received upstream.
    pub fn decode(&self, rdata: &[u8]) -> Result<RecordData, WireError> {
        if !(self.accepts)(rdata) {
            return Err(WireError::InvalidRdata {
                rtype: self.rtype,
                len: rdata.len(),
            });
        }
        Ok(RecordData {
            rtype: self.rtype,
            rdata: Bytes::copy_from_slice(rdata),
        })
    }

    /// Reads the persisted text form back.
    pub fn parse(&self, text: &str) -> Option<RecordData> {
        let rdata = (self.parse)(text)?;
        (self.accepts)(&rdata[..]).then(|| RecordData {
            rtype: self.rtype,
            rdata,
        })
    }
}

static CODECS: [RecordCodec; 2] = [
    RecordCodec {
        rtype: RecordType::A,
        name: "a",
        accepts: accepts_a,
        format: format_a,
        parse: parse_a,
    },
    RecordCodec {
        rtype: RecordType::NS,
        name: "ns",
        accepts: accepts_any,
        format: format_base64,
        parse: parse_base64,
    },
];

// https://datatracker.ietf.org/doc/html/rfc1035#section-3.4.1
fn accepts_a(rdata: &[u8]) -> bool {
    rdata.len() == 4
}

fn format_a(rdata: &[u8]) -> String {
    match <[u8; 4]>::try_from(rdata) {
        Ok(octets) => Ipv4Addr::from(octets).to_string(),
        Err(_) => format_base64(rdata),
    }
}

fn parse_a(text: &str) -> Option<Bytes> {
    let address: Ipv4Addr = text.parse().ok()?;
    Some(Bytes::copy_from_slice(&address.octets()))
}

fn accepts_any(_: &[u8]) -> bool {
    true
}

fn format_base64(rdata: &[u8]) -> String {
    base64::encode(rdata)
}

fn parse_base64(text: &str) -> Option<Bytes> {
    base64::decode(text).ok().map(Bytes::from)
}

pub fn codec(rtype: RecordType) -> Option<&'static RecordCodec> {
    CODECS.iter().find(|c| c.rtype == rtype)
}

pub fn codec_by_name(name: &str) -> Option<&'static RecordCodec> {
    CODECS.iter().find(|c| c.name.eq_ignore_ascii_case(name))
}

/// A client query reduced to what is needed to answer it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    pub id: ID,
    pub opcode: u8,
    pub domain: DomainName,
    pub qtype: RecordType,
    pub qclass: u16,
}

/* Question section

                                1  1  1  1  1  1
  0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                                               |
/                     QNAME                     /
/                                               /
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                     QTYPE                     |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
|                     QCLASS                    |
+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
*/
pub fn decode_query(bytes: &[u8]) -> Result<Query, WireError> {
    let mut cursor = Cursor::new(bytes);

    let header = Header::read_from(&mut cursor)?;
    // Only the first question is answered, as every resolver in practice sends one
    let domain = read_name(&mut cursor)?;
    let qtype = RecordType::from(cursor.read_u16::<NetworkEndian>()?);
    let qclass = cursor.read_u16::<NetworkEndian>()?;

    Ok(Query {
        id: header.id,
        opcode: header.flags.opcode(),
        domain,
        qtype,
        qclass,
    })
}

pub fn write_question<B: BufMut>(
    domain: &DomainName,
    qtype: RecordType,
    qclass: u16,
    buf: &mut B,
) -> Result<(), WireError> {
    write_name(domain, buf)?;
    buf.put_u16(qtype.code());
    buf.put_u16(qclass);
    Ok(())
}

/// Builds the query sent upstream: sentinel ID, recursion desired, a single IN question.
pub fn encode_query(domain: &DomainName, qtype: RecordType) -> Result<Vec<u8>, WireError> {
    let mut header = Header::new(UPSTREAM_QUERY_ID, HeaderFlags::new().with_rd(true));
    header.question_count = 1;

    let mut buf = Vec::with_capacity(MAX_PACKET_SIZE);
    header.write_to(&mut buf);
    write_question(domain, qtype, CLASS_IN, &mut buf)?;
    Ok(buf)
}

/*
Each resource record has the following format:
                                    1  1  1  1  1  1
      0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    /                      NAME                     /
    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    |                      TYPE                     |
    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    |                     CLASS                     |
    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    |                      TTL                      |
    |                                               |
    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
    |                   RDLENGTH                    |
    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--|
    /                     RDATA                     /
    +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
 */
/// Decodes `answer_count` answer records following the echoed question of an upstream reply.
///
/// Records of types without a codec are stepped over and produce nothing.
pub fn decode_answer(message: &[u8], answer_count: u16) -> Result<Vec<ResourceRecord>, WireError> {
    if message.len() < HEADER_SIZE {
        return Err(WireError::Truncated);
    }

    let mut cursor = Cursor::new(message);
    cursor.set_position(HEADER_SIZE as u64);

    // Echoed question
    read_name(&mut cursor)?;
    take_slice(&mut cursor, 4)?;

    let mut records = Vec::with_capacity(answer_count.into());
    for _ in 0..answer_count {
        skip_name(&mut cursor)?;
        let rtype = RecordType::from(cursor.read_u16::<NetworkEndian>()?);
        let _class = cursor.read_u16::<NetworkEndian>()?;
        let ttl = cursor.read_u32::<NetworkEndian>()?;
        let rdlength = cursor.read_u16::<NetworkEndian>()?;
        let rdata = take_slice(&mut cursor, rdlength.into())?;

        match codec(rtype) {
            Some(codec) => records.push(ResourceRecord {
                ttl,
                data: codec.decode(rdata)?,
            }),
            None => trace!(%rtype, rdlength, "Skipping answer record"),
        }
    }

    Ok(records)
}

/// Writes one answer record whose owner name points back at the question name.
pub fn encode_answer_record<B: BufMut>(
    record: &ResourceRecord,
    buf: &mut B,
) -> Result<(), WireError> {
    let rtype = record.rtype();
    let rdata = record.data.rdata();
    let rdlength = u16::try_from(rdata.len()).map_err(|_| WireError::InvalidRdata {
        rtype,
        len: rdata.len(),
    })?;

    buf.put_slice(&QUESTION_NAME_POINTER);
    buf.put_u16(rtype.code());
    buf.put_u16(CLASS_IN);
    buf.put_u32(record.ttl);
    buf.put_u16(rdlength);
    buf.put_slice(rdata);
    Ok(())
}

#[cfg(test)]
mod tests {

    use super::*;

    fn example_com() -> DomainName {
        "example.com".parse().unwrap()
    }

    // Synthetic reply to an A query for example.com, answer records appended by each test
    fn reply_with_answers(ancount: u16, answers: &[u8]) -> Vec<u8> {
        let mut bytes = vec![
            0xaa, 0xaa, // ID
            0x81, 0x80, // flags = qr rd ra
            0x00, 0x01, // qdcount
        ];
        bytes.extend_from_slice(&ancount.to_be_bytes());
        bytes.extend_from_slice(&[
            0x00, 0x00, // nscount
            0x00, 0x00, // arcount
            0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, // example
            0x03, 0x63, 0x6f, 0x6d, // com
            0x00, // null terminator
            0x00, 0x01, // qtype
            0x00, 0x01, // qclass
        ]);
        bytes.extend_from_slice(answers);
        bytes
    }

    #[test]
    fn decode_query_example_com_a() {
        // Captured query from running `dig +noedns example.com`
        const QUERY: [u8; 29] = [
            0xcd, 0xf0, // ID
            0x01, 0x20, // flags = rd, z = 2
            0x00, 0x01, // qdcount
            0x00, 0x00, // ancount
            0x00, 0x00, // nscount
            0x00, 0x00, // arcount
            0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, // example
            0x03, 0x63, 0x6f, 0x6d, // com
            0x00, // null terminator
            0x00, 0x01, // qtype
            0x00, 0x01, // qclass
        ];
        let query = decode_query(&QUERY[..]).unwrap();
        assert_eq!(
            query,
            Query {
                id: 0xcdf0,
                opcode: 0,
                domain: example_com(),
                qtype: RecordType::A,
                qclass: 1,
            }
        );

        // Dropping the last byte of QCLASS
        assert_eq!(decode_query(&QUERY[..28]), Err(WireError::Truncated));
    }

    #[test]
    fn decode_query_keeps_unsupported_type() {
        let mut bytes = encode_query(&example_com(), RecordType::from(15)).unwrap();
        bytes[2] = 0x29; // opcode = 5
        let query = decode_query(&bytes).unwrap();
        assert_eq!(query.qtype, RecordType::from(15));
        assert_eq!(query.opcode, 5);
        assert_eq!(query.qtype.to_string(), "MX");
        assert!(!query.qtype.is_supported());
    }

    #[test]
    fn decode_query_rejects_short_header() {
        assert_eq!(
            decode_query(&[0x12, 0x34, 0x01]),
            Err(WireError::Truncated)
        );
    }

    #[test]
    fn decode_query_rejects_label_past_end() {
        let bytes = [
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x07, 0x65, 0x78, // label claims 7 bytes, only 2 follow
        ];
        assert_eq!(decode_query(&bytes), Err(WireError::Truncated));
    }

    #[test]
    fn decode_query_rejects_compressed_name() {
        let bytes = [
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01,
        ];
        assert_eq!(decode_query(&bytes), Err(WireError::CompressedQuestion));
    }

    #[test]
    fn encode_query_example_com_ns() {
        let bytes = encode_query(&example_com(), RecordType::NS).unwrap();
        assert_eq!(
            bytes,
            [
                0xaa, 0xaa, // ID
                0x01, 0x00, // flags = rd
                0x00, 0x01, // qdcount
                0x00, 0x00, // ancount
                0x00, 0x00, // nscount
                0x00, 0x00, // arcount
                0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, // example
                0x03, 0x63, 0x6f, 0x6d, // com
                0x00, // null terminator
                0x00, 0x02, // qtype
                0x00, 0x01, // qclass
            ]
        );
    }

    #[test]
    fn encode_query_rejects_long_label() {
        let label = "a".repeat(64);
        let name = DomainName {
            labels: vec![label, "com".to_string()],
        };
        assert_eq!(
            encode_query(&name, RecordType::A),
            Err(WireError::LabelTooLong(64))
        );
    }

    #[test]
    fn decode_answer_two_a_records() {
        let bytes = reply_with_answers(
            2,
            &[
                0xc0, 0x0c, // NAME, pointer to offset 12
                0x00, 0x01, // TYPE
                0x00, 0x01, // CLASS
                0x00, 0x00, 0x01, 0x2c, // TTL=300
                0x00, 0x04, // rdlength=4
                0x5d, 0xb8, 0xd8, 0x22, // rdata=93.184.216.34
                0xc0, 0x0c, // NAME
                0x00, 0x01, // TYPE
                0x00, 0x01, // CLASS
                0x00, 0x00, 0x00, 0x3c, // TTL=60
                0x00, 0x04, // rdlength=4
                0xc0, 0xa8, 0x00, 0x01, // rdata=192.168.0.1
            ],
        );

        let records = decode_answer(&bytes, 2).unwrap();

        assert_eq!(
            records,
            vec![
                ResourceRecord {
                    ttl: 300,
                    data: RecordData::a(Ipv4Addr::new(93, 184, 216, 34)),
                },
                ResourceRecord {
                    ttl: 60,
                    data: RecordData::a(Ipv4Addr::new(192, 168, 0, 1)),
                },
            ]
        );
        assert_eq!(records[0].data.to_text(), "93.184.216.34");
        assert_eq!(records[1].data.to_text(), "192.168.0.1");
    }

    #[test]
    fn decode_answer_skips_unsupported_types() {
        let bytes = reply_with_answers(
            2,
            &[
                0xc0, 0x0c, // NAME
                0x00, 0x05, // TYPE=CNAME
                0x00, 0x01, // CLASS
                0x00, 0x00, 0x0e, 0x10, // TTL=3600
                0x00, 0x06, // rdlength=6
                0x03, 0x77, 0x77, 0x77, 0xc0, 0x0c, // www + pointer
                0xc0, 0x0c, // NAME
                0x00, 0x01, // TYPE=A
                0x00, 0x01, // CLASS
                0x00, 0x00, 0x00, 0x3c, // TTL=60
                0x00, 0x04, // rdlength=4
                0x0a, 0x00, 0x00, 0x01, // rdata=10.0.0.1
            ],
        );

        assert_eq!(
            decode_answer(&bytes, 2).unwrap(),
            vec![ResourceRecord {
                ttl: 60,
                data: RecordData::a(Ipv4Addr::new(10, 0, 0, 1)),
            }]
        );
    }

    #[test]
    fn decode_answer_keeps_ns_rdata_opaque() {
        let rdata = [0x01, 0x61, 0x0c, 0x67, 0x74, 0x6c, 0x64, 0xc0, 0x14];
        let mut answers = vec![
            0xc0, 0x0c, // NAME
            0x00, 0x02, // TYPE=NS
            0x00, 0x01, // CLASS
            0x00, 0x02, 0xa3, 0x00, // TTL=172800
            0x00, 0x09, // rdlength=9
        ];
        answers.extend_from_slice(&rdata);
        let bytes = reply_with_answers(1, &answers);

        let records = decode_answer(&bytes, 1).unwrap();

        assert_eq!(
            records,
            vec![ResourceRecord {
                ttl: 172800,
                data: RecordData::ns(Bytes::copy_from_slice(&rdata)),
            }]
        );
    }

    #[test]
    fn decode_answer_rejects_truncated_rdata() {
        let bytes = reply_with_answers(
            1,
            &[
                0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01, 0x2c, //
                0x00, 0x04, // rdlength=4
                0x5d, 0xb8, // only two bytes
            ],
        );
        assert_eq!(decode_answer(&bytes, 1), Err(WireError::Truncated));
    }

    #[test]
    fn decode_answer_rejects_missing_records() {
        let bytes = reply_with_answers(3, &[]);
        assert_eq!(decode_answer(&bytes, 3), Err(WireError::Truncated));
    }

    #[test]
    fn decode_answer_rejects_bad_a_length() {
        let bytes = reply_with_answers(
            1,
            &[
                0xc0, 0x0c, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x01, 0x2c, //
                0x00, 0x03, // rdlength=3
                0x5d, 0xb8, 0xd8,
            ],
        );
        assert_eq!(
            decode_answer(&bytes, 1),
            Err(WireError::InvalidRdata {
                rtype: RecordType::A,
                len: 3
            })
        );
    }

    #[test]
    fn encode_answer_record_a() {
        let record = ResourceRecord {
            ttl: 300,
            data: RecordData::a(Ipv4Addr::new(93, 184, 216, 34)),
        };
        let mut buf = Vec::new();
        encode_answer_record(&record, &mut buf).unwrap();
        assert_eq!(
            buf,
            [
                0xc0, 0x0c, // NAME
                0x00, 0x01, // TYPE
                0x00, 0x01, // CLASS
                0x00, 0x00, 0x01, 0x2c, // TTL
                0x00, 0x04, // RDLENGTH
                0x5d, 0xb8, 0xd8, 0x22, // RDATA
            ]
        );
    }

    #[test]
    fn header_write_to_with_request() {
        let mut header = Header::new(6666, HeaderFlags::new().with_rd(true).with_z(2));
        header.question_count = 1;
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert_eq!(
            [0x1a, 0x0a, 0x01, 0x20, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            &buf[..]
        )
    }

    #[test]
    fn domain_names_compare_case_insensitively() {
        let upper: DomainName = "Example.COM".parse().unwrap();
        assert_eq!(upper, example_com());
        assert_eq!(upper.key(), "example.com");
        assert_eq!(upper.to_string(), "Example.COM");

        let fqdn: DomainName = "example.com.".parse().unwrap();
        assert_eq!(fqdn, example_com());
        assert_eq!(".".parse::<DomainName>().unwrap(), DomainName::root());
        assert_eq!("a..b".parse::<DomainName>(), Err(WireError::EmptyLabel));
    }

    #[test]
    fn codecs_are_looked_up_by_type_and_name() {
        assert_eq!(codec(RecordType::A).unwrap().name, "a");
        assert_eq!(codec_by_name("NS").unwrap().rtype, RecordType::NS);
        assert!(codec(RecordType::from(12)).is_none());
        assert_eq!(RecordType::from(999).to_string(), "TYPE999");
    }

    #[test]
    fn decode_query_rejects_dot_inside_label() {
        let bytes = [
            0x12, 0x34, 0x01, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, //
            0x03, 0x61, 0x2e, 0x62, // "a.b"
            0x03, 0x63, 0x6f, 0x6d, // com
            0x00, // null terminator
            0x00, 0x01, 0x00, 0x01,
        ];
        assert_eq!(decode_query(&bytes), Err(WireError::InvalidLabel));
    }

    #[test]
    fn codecs_convert_between_text_and_rdata() {
        let a = codec(RecordType::A).unwrap();
        let parsed = a.parse("10.0.0.1").unwrap();
        assert_eq!(parsed, RecordData::a(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(&parsed.rdata()[..], &[10, 0, 0, 1]);
        assert_eq!(parsed.to_text(), "10.0.0.1");
        assert_eq!(a.decode(&[10, 0, 0, 1]).unwrap(), parsed);
        assert!(a.parse("10.0.0").is_none());

        let ns = codec_by_name("ns").unwrap();
        let data = ns.decode(&[0x01, 0x61, 0xc0, 0x0c]).unwrap();
        assert_eq!(data.rtype(), RecordType::NS);
        assert_eq!(data.to_text(), "AWHADA==");
        assert_eq!(ns.parse("AWHADA==").unwrap(), data);

        assert_eq!(RecordType::from(2), RecordType::NS);
        assert_eq!(RecordType::NS.code(), 2);
    }
}
