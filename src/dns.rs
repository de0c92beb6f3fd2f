//! DNS message helpers.
//!
//! Wire encoding is handled by `hickory_proto`; this module covers the
//! pieces the resolver needs on top of it: question keys, blocked answers,
//! failure replies and A-record inspection.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA};
use hickory_proto::rr::{DNSClass, Name, RData, Record, RecordType};

/// Which address family an IN query asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpQuery {
    V4,
    V6,
}

/// The first question of a DNS message, normalized for keying and logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub qname: String,
    pub qtype: RecordType,
    pub qclass: DNSClass,
}

impl Question {
    /// Extract the first question from a message.
    pub fn from_message(message: &Message) -> Option<Self> {
        let query = message.queries().first()?;

        Some(Self {
            qname: unfqdn(query.name()),
            qtype: query.query_type(),
            qclass: query.query_class(),
        })
    }

    /// Cache key shared by UDP and TCP: `qname|qclass|qtype`.
    pub fn key(&self) -> String {
        format!("{}|{}|{}", self.qname, self.qclass, self.qtype)
    }

    /// Only class IN A/AAAA questions take part in caching and blocking.
    pub fn ip_query(&self) -> Option<IpQuery> {
        if self.qclass != DNSClass::IN {
            return None;
        }

        match self.qtype {
            RecordType::A => Some(IpQuery::V4),
            RecordType::AAAA => Some(IpQuery::V6),
            _ => None,
        }
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.qname, self.qclass, self.qtype)
    }
}

/// Addresses and TTL used for answers to blocked names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NullRoute {
    pub v4: Ipv4Addr,
    pub v6: Ipv6Addr,
    pub ttl: u32,
}

impl Default for NullRoute {
    fn default() -> Self {
        Self {
            v4: Ipv4Addr::UNSPECIFIED,
            v6: Ipv6Addr::UNSPECIFIED,
            ttl: 600,
        }
    }
}

/// Lowercased domain name without the trailing root dot.
pub fn unfqdn(name: &Name) -> String {
    let ascii = name.to_ascii().to_lowercase();

    match ascii.strip_suffix('.') {
        Some(stripped) if !stripped.is_empty() => stripped.to_string(),
        _ => ascii,
    }
}

/// Start a reply to `request`: same id, opcode, RD flag and question section.
pub fn reply_to(request: &Message) -> Message {
    let mut reply = Message::new();
    reply
        .set_id(request.id())
        .set_message_type(MessageType::Response)
        .set_op_code(request.op_code())
        .set_recursion_desired(request.recursion_desired())
        .set_recursion_available(true)
        .set_response_code(ResponseCode::NoError);
    reply.add_queries(request.queries().iter().cloned());

    reply
}

/// Build the answer for a blocked name: one A or AAAA record pointing at the null route.
pub fn blocked_response(request: &Message, kind: IpQuery, route: &NullRoute) -> Message {
    let mut reply = reply_to(request);

    if let Some(query) = request.queries().first() {
        let rdata = match kind {
            IpQuery::V4 => RData::A(A(route.v4)),
            IpQuery::V6 => RData::AAAA(AAAA(route.v6)),
        };
        reply.add_answer(Record::from_rdata(query.name().clone(), route.ttl, rdata));
    }

    reply
}

/// An empty reply carrying only an error code (SERVFAIL for resolution failures).
pub fn failure_response(request: &Message, rcode: ResponseCode) -> Message {
    let mut reply = reply_to(request);
    reply.set_response_code(rcode);
    reply
}

/// Copy a cached message for a new client, taking the transaction ID and
/// question section (with its exact letter case) from `request`.
pub fn response_from_cache(cached: &Message, request: &Message) -> Message {
    let mut response = cached.clone();
    response.set_id(request.id());
    response.take_queries();
    response.add_queries(request.queries().iter().cloned());
    response
}

/// Addresses of all A records in the answer section, in order.
pub fn a_records(message: &Message) -> impl Iterator<Item = Ipv4Addr> + '_ {
    message.answers().iter().filter_map(|record| match record.data() {
        RData::A(a) => Some(a.0),
        _ => None,
    })
}

/// The first A record of the answer section, if any.
pub fn first_a_record(message: &Message) -> Option<Ipv4Addr> {
    a_records(message).next()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::net::Ipv4Addr;
    use std::str::FromStr;

    use hickory_proto::op::{Message, MessageType, Query, ResponseCode};
    use hickory_proto::rr::rdata::A;
    use hickory_proto::rr::{Name, RData, Record, RecordType};

    /// A recursive query for `domain`.
    pub fn query(id: u16, domain: &str, qtype: RecordType) -> Message {
        let mut message = Message::new();
        message
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_recursion_desired(true);
        let name = Name::from_str(domain).expect("valid name");
        message.add_query(Query::query(name, qtype));
        message
    }

    /// A successful reply to `request` with one A record per address.
    pub fn a_reply(request: &Message, ips: &[Ipv4Addr]) -> Message {
        let mut reply = super::reply_to(request);
        let name = request.queries()[0].name().clone();
        for ip in ips {
            reply.add_answer(Record::from_rdata(name.clone(), 300, RData::A(A(*ip))));
        }
        reply
    }

    /// A reply to `request` with the given rcode and no answers.
    pub fn rcode_reply(request: &Message, rcode: ResponseCode) -> Message {
        let mut reply = super::reply_to(request);
        reply.set_response_code(rcode);
        reply
    }
}
