use std::net::Ipv4Addr;

use crate::Mac;

const DISCOVER: [u8; 6] = [0x68, 0x64, 0x00, 0x06, 0x71, 0x61];
const SUBSCRIBE: [u8; 6] = [0x68, 0x64, 0x00, 0x1e, 0x63, 0x6c];
const QUERY_NAME: [u8; 6] = [0x68, 0x64, 0x00, 0x1d, 0x72, 0x74];
const SET_STATE: [u8; 6] = [0x68, 0x64, 0x00, 0x17, 0x64, 0x63];

const DISCOVERED: [u8; 6] = [0x68, 0x64, 0x00, 0x2a, 0x71, 0x61];
const NAMED: [u8; 6] = [0x68, 0x64, 0x00, 0xdc, 0x72, 0x74];
const SUBSCRIBED: [u8; 6] = [0x68, 0x64, 0x00, 0x18, 0x63, 0x6c];
const STATE_CHANGED: [u8; 6] = [0x68, 0x64, 0x00, 0x17, 0x73, 0x66];

const PADDING: [u8; 6] = [0x20; 6];
const QUERY_NAME_TRAILER: [u8; 11] = [0x00, 0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00];
const SET_STATE_TRAILER: [u8; 4] = [0x00; 4];

// every Orvibo MAC starts with the vendor prefix
const MAC_MARKER: [u8; 2] = [0xac, 0xcf];

const NAME_LEN: usize = 16;
const NAME_PADDING_INDEX: usize = 4;

/// Frames sent by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Discover,
    Subscribe(Mac),
    QueryName(Mac),
    SetState(Mac, bool),
}

/// Kind of response a request waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reply {
    Discovered,
    Subscribed,
    Named,
    StateChanged,
}

/// Frames sent by sockets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Discovered { mac: Mac, ip: Ipv4Addr, state: bool },
    Subscribed { mac: Mac, state: bool },
    Named { mac: Mac, name: Option<String> },
    StateChanged { mac: Mac, state: bool },
    Unrecognized,
}

impl Request {
    pub fn mac(&self) -> Option<Mac> {
        match self {
            Request::Discover => None,
            Request::Subscribe(mac) | Request::QueryName(mac) | Request::SetState(mac, _) => {
                Some(*mac)
            }
        }
    }

    pub fn reply(&self) -> Reply {
        match self {
            Request::Discover => Reply::Discovered,
            Request::Subscribe(_) => Reply::Subscribed,
            Request::QueryName(_) => Reply::Named,
            Request::SetState(_, _) => Reply::StateChanged,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32);

        match self {
            Request::Discover => bytes.extend_from_slice(&DISCOVER),
            Request::Subscribe(mac) => {
                bytes.extend_from_slice(&SUBSCRIBE);
                bytes.extend_from_slice(&mac.0);
                bytes.extend_from_slice(&PADDING);
                bytes.extend_from_slice(&mac.reversed());
                bytes.extend_from_slice(&PADDING);
            }
            Request::QueryName(mac) => {
                bytes.extend_from_slice(&QUERY_NAME);
                bytes.extend_from_slice(&mac.0);
                bytes.extend_from_slice(&PADDING);
                bytes.extend_from_slice(&QUERY_NAME_TRAILER);
            }
            Request::SetState(mac, on) => {
                bytes.extend_from_slice(&SET_STATE);
                bytes.extend_from_slice(&mac.0);
                bytes.extend_from_slice(&PADDING);
                bytes.extend_from_slice(&SET_STATE_TRAILER);
                bytes.push(*on as u8);
            }
        }

        bytes
    }

    /// Parses a frame produced by [`Request::encode`]. The MAC of a request
    /// always sits right after the header.
    pub fn decode(bytes: &[u8]) -> Option<Request> {
        let header = bytes.get(..6)?;

        if header == DISCOVER {
            return (bytes.len() == DISCOVER.len()).then_some(Request::Discover);
        }

        let mac = read_mac(bytes.get(6..12)?);

        if header == SUBSCRIBE && bytes.len() == 30 {
            Some(Request::Subscribe(mac))
        } else if header == QUERY_NAME && bytes.len() == 29 {
            Some(Request::QueryName(mac))
        } else if header == SET_STATE && bytes.len() == 23 {
            Some(Request::SetState(mac, bytes[22] & 1 == 1))
        } else {
            None
        }
    }
}

impl Response {
    pub fn decode(bytes: &[u8], source: Ipv4Addr) -> Response {
        let header = match bytes.get(..6) {
            Some(header) => header,
            None => return Response::Unrecognized,
        };

        let mac = match find(bytes, &MAC_MARKER).and_then(|pos| bytes.get(pos..pos + 6)) {
            Some(mac) => read_mac(mac),
            None => return Response::Unrecognized,
        };

        let state = bytes.last().map(|b| b & 1 == 1).unwrap_or_default();

        if header == DISCOVERED {
            Response::Discovered {
                mac,
                ip: source,
                state,
            }
        } else if header == NAMED {
            Response::Named {
                mac,
                name: parse_name(bytes),
            }
        } else if header == SUBSCRIBED {
            Response::Subscribed { mac, state }
        } else if header == STATE_CHANGED {
            Response::StateChanged { mac, state }
        } else {
            Response::Unrecognized
        }
    }

    pub fn reply(&self) -> Option<(Mac, Reply)> {
        match self {
            Response::Discovered { mac, .. } => Some((*mac, Reply::Discovered)),
            Response::Subscribed { mac, .. } => Some((*mac, Reply::Subscribed)),
            Response::Named { mac, .. } => Some((*mac, Reply::Named)),
            Response::StateChanged { mac, .. } => Some((*mac, Reply::StateChanged)),
            Response::Unrecognized => None,
        }
    }
}

fn read_mac(bytes: &[u8]) -> Mac {
    let mut mac = [0; 6];
    mac.copy_from_slice(bytes);
    Mac(mac)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// The name is the 16-byte block after the fourth run of padding. A socket
/// without a name answers with `ff` bytes.
fn parse_name(bytes: &[u8]) -> Option<String> {
    let mut offset = 0;

    for _ in 0..NAME_PADDING_INDEX {
        let pos = find(&bytes[offset..], &PADDING)?;
        offset += pos + PADDING.len();
    }

    let end = bytes.len().min(offset + NAME_LEN);
    let block = &bytes[offset..end];

    if block.is_empty() || block.iter().all(|b| *b == 0xff) {
        return None;
    }

    let name = String::from_utf8_lossy(block);
    let name = name.trim_end();

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use hex_literal::hex;

    const MAC: Mac = Mac(hex!("accf230a1bff"));
    const SOURCE: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    const DISCOVERED_FRAME: [u8; 42] = hex!(
        "6864 002a 7161 00 accf230a1bff 202020202020 ff1b0a23cfac 202020202020
         534f43303032 5c2a0bd9 01"
    );

    const SUBSCRIBED_FRAME: [u8; 24] =
        hex!("6864 0018 636c accf230a1bff 202020202020 0000000000 00");

    const STATE_CHANGED_FRAME: [u8; 23] =
        hex!("6864 0017 7366 accf230a1bff 202020202020 00000000 01");

    pub(crate) fn discovered_frame(mac: Mac, state: bool) -> Vec<u8> {
        let mut bytes = DISCOVERED.to_vec();
        bytes.push(0x00);
        bytes.extend_from_slice(&mac.0);
        bytes.extend_from_slice(&PADDING);
        bytes.extend_from_slice(&mac.reversed());
        bytes.extend_from_slice(&PADDING);
        bytes.extend_from_slice(b"SOC002");
        bytes.extend_from_slice(&hex!("5c2a0bd9"));
        bytes.push(state as u8);
        bytes
    }

    pub(crate) fn subscribed_frame(mac: Mac, state: bool) -> Vec<u8> {
        let mut bytes = SUBSCRIBED.to_vec();
        bytes.extend_from_slice(&mac.0);
        bytes.extend_from_slice(&PADDING);
        bytes.extend_from_slice(&[0x00; 5]);
        bytes.push(state as u8);
        bytes
    }

    pub(crate) fn state_changed_frame(mac: Mac, state: bool) -> Vec<u8> {
        let mut bytes = STATE_CHANGED.to_vec();
        bytes.extend_from_slice(&mac.0);
        bytes.extend_from_slice(&PADDING);
        bytes.extend_from_slice(&[0x00; 4]);
        bytes.push(state as u8);
        bytes
    }

    pub(crate) fn named_frame(mac: Mac, name: &[u8; 16]) -> Vec<u8> {
        let mut bytes = NAMED.to_vec();
        bytes.extend_from_slice(&mac.0);
        bytes.extend_from_slice(&PADDING);
        bytes.extend_from_slice(&mac.reversed());
        bytes.extend_from_slice(&PADDING);
        bytes.extend_from_slice(&hex!("0000000004 00 8a 00"));
        bytes.extend_from_slice(&PADDING);
        bytes.extend_from_slice(&hex!("1c00 0000 3130 3030"));
        bytes.extend_from_slice(&PADDING);
        bytes.extend_from_slice(name);
        bytes.extend_from_slice(&hex!("0400 2000 0000 0100 0000"));
        bytes.resize(0xdc, 0);
        bytes
    }

    #[test]
    fn test_frame_builders() {
        assert_eq!(discovered_frame(MAC, true), DISCOVERED_FRAME);
        assert_eq!(subscribed_frame(MAC, false), SUBSCRIBED_FRAME);
        assert_eq!(state_changed_frame(MAC, true), STATE_CHANGED_FRAME);
        assert_eq!(named_frame(MAC, &[0xff; 16]).len(), 0xdc);
    }

    #[test]
    fn test_encode_discover() {
        assert_eq!(Request::Discover.encode(), hex!("6864 0006 7161"));
    }

    #[test]
    fn test_encode_subscribe() {
        assert_eq!(
            Request::Subscribe(MAC).encode(),
            hex!("6864 001e 636c accf230a1bff 202020202020 ff1b0a23cfac 202020202020")
        );
    }

    #[test]
    fn test_encode_query_name() {
        assert_eq!(
            Request::QueryName(MAC).encode(),
            hex!("6864 001d 7274 accf230a1bff 202020202020 0000000004000000000000")
        );
    }

    #[test]
    fn test_encode_set_state() {
        assert_eq!(
            Request::SetState(MAC, true).encode(),
            hex!("6864 0017 6463 accf230a1bff 202020202020 00000000 01")
        );
        assert_eq!(
            Request::SetState(MAC, false).encode(),
            hex!("6864 0017 6463 accf230a1bff 202020202020 00000000 00")
        );
    }

    #[test]
    fn test_request_round_trip() {
        let macs = [
            MAC,
            Mac(hex!("000000000000")),
            Mac(hex!("ffffffffffff")),
            Mac(hex!("accf00000001")),
        ];

        assert_eq!(
            Request::decode(&Request::Discover.encode()),
            Some(Request::Discover)
        );

        for mac in macs {
            let requests = [
                Request::Subscribe(mac),
                Request::QueryName(mac),
                Request::SetState(mac, true),
                Request::SetState(mac, false),
            ];

            for request in requests {
                let decoded = Request::decode(&request.encode()).unwrap();
                assert_eq!(decoded, request);
                assert_eq!(decoded.mac(), Some(mac));
            }
        }
    }

    #[test]
    fn test_request_decode_truncated() {
        let bytes = Request::Subscribe(MAC).encode();
        assert_eq!(Request::decode(&bytes[..20]), None);
        assert_eq!(Request::decode(&bytes[..4]), None);
    }

    #[test]
    fn test_decode_discovered() {
        assert_eq!(
            Response::decode(&DISCOVERED_FRAME, SOURCE),
            Response::Discovered {
                mac: MAC,
                ip: SOURCE,
                state: true
            }
        );
    }

    #[test]
    fn test_decode_subscribed() {
        assert_eq!(
            Response::decode(&SUBSCRIBED_FRAME, SOURCE),
            Response::Subscribed {
                mac: MAC,
                state: false
            }
        );
    }

    #[test]
    fn test_decode_state_changed() {
        assert_eq!(
            Response::decode(&STATE_CHANGED_FRAME, SOURCE),
            Response::StateChanged {
                mac: MAC,
                state: true
            }
        );
    }

    #[test]
    fn test_decode_name() {
        let frame = named_frame(MAC, b"Kitchen lamp    ");

        assert_eq!(
            Response::decode(&frame, SOURCE),
            Response::Named {
                mac: MAC,
                name: Some("Kitchen lamp".to_string())
            }
        );
    }

    #[test]
    fn test_decode_missing_name() {
        let frame = named_frame(MAC, &[0xff; 16]);

        assert_eq!(
            Response::decode(&frame, SOURCE),
            Response::Named {
                mac: MAC,
                name: None
            }
        );
    }

    #[test]
    fn test_decode_unrecognized() {
        assert_eq!(
            Response::decode(&hex!("6864 0006 7161"), SOURCE),
            Response::Unrecognized
        );
        assert_eq!(
            Response::decode(&hex!("6864 0017 7366 0000 0000 0001 01"), SOURCE),
            Response::Unrecognized
        );
        assert_eq!(Response::decode(&hex!("6864"), SOURCE), Response::Unrecognized);
        assert_eq!(Response::decode(&[], SOURCE), Response::Unrecognized);

        let mut frame = SUBSCRIBED_FRAME;
        frame[5] = 0x00;
        assert_eq!(Response::decode(&frame, SOURCE), Response::Unrecognized);
    }

    #[test]
    fn test_response_reply() {
        let response = Response::decode(&SUBSCRIBED_FRAME, SOURCE);
        assert_eq!(response.reply(), Some((MAC, Reply::Subscribed)));
        assert_eq!(Request::Subscribe(MAC).reply(), Reply::Subscribed);
        assert_eq!(Response::Unrecognized.reply(), None);
    }
}
