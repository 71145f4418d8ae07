use crate::protocol::*;

/// Composes the reply to `request` carrying `records` as its answer section.
///
/// The ID and opcode are copied from the request. The reply is always flagged as an
/// authoritative, recursion-available answer with no error, and each answer record
/// points back at the echoed question name.
pub fn build_response(request: &Query, records: &[ResourceRecord]) -> Result<Vec<u8>, WireError> {
    let flags = HeaderFlags::new()
        .with_qr(true)
        .with_opcode(request.opcode & 0x0f)
        .with_aa(true)
        .with_tc(false)
        .with_rd(true)
        .with_ra(true)
        .with_z(0)
        .with_rcode(0);

    let mut header = Header::new(request.id, flags);
    header.question_count = 1;
    header.answer_count = u16::try_from(records.len()).unwrap_or(u16::MAX);

    let mut buf = Vec::with_capacity(MAX_PACKET_SIZE);
    header.write_to(&mut buf);
    write_question(&request.domain, request.qtype, request.qclass, &mut buf)?;
    for record in records.iter().take(header.answer_count.into()) {
        encode_answer_record(record, &mut buf)?;
    }

    Ok(buf)
}
