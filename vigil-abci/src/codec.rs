//! Frame format: `[4-byte BE length][1-byte protocol version][borsh payload]`.
//!
//! The length covers the version byte plus the payload.

use borsh::{BorshDeserialize, BorshSerialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AbciError;

/// Wire protocol version. Bump on any breaking change to [`crate::types`].
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest accepted frame body (version byte + payload).
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Encode a message into a complete frame.
pub fn encode_frame<T: BorshSerialize>(msg: &T) -> Result<Vec<u8>, AbciError> {
    let payload = borsh::to_vec(msg).map_err(|e| AbciError::CodecError {
        reason: e.to_string(),
    })?;
    let body_len = 1 + payload.len();
    if body_len > MAX_FRAME_SIZE {
        return Err(AbciError::FrameTooLarge {
            size: body_len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut out = Vec::with_capacity(4 + body_len);
    out.extend_from_slice(&(body_len as u32).to_be_bytes());
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a frame body (everything after the length prefix).
pub fn decode_body<T: BorshDeserialize>(body: &[u8]) -> Result<T, AbciError> {
    let (&version, payload) = body.split_first().ok_or_else(|| AbciError::CodecError {
        reason: "frame too short: missing protocol version byte".to_string(),
    })?;
    if version != PROTOCOL_VERSION {
        return Err(AbciError::VersionMismatch {
            peer: version,
            ours: PROTOCOL_VERSION,
        });
    }
    T::try_from_slice(payload).map_err(|e| AbciError::CodecError {
        reason: e.to_string(),
    })
}

/// Read one frame. Returns `Ok(None)` on a clean EOF before the length prefix.
pub async fn read_frame<R, T>(io: &mut R) -> Result<Option<T>, AbciError>
where
    R: AsyncRead + Unpin,
    T: BorshDeserialize,
{
    let mut len_buf = [0u8; 4];
    match io.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(AbciError::FrameTooLarge {
            size: len,
            max: MAX_FRAME_SIZE,
        });
    }
    let mut body = vec![0u8; len];
    io.read_exact(&mut body).await?;
    decode_body(&body).map(Some)
}

/// Write one frame and flush.
pub async fn write_frame<W, T>(io: &mut W, msg: &T) -> Result<(), AbciError>
where
    W: AsyncWrite + Unpin,
    T: BorshSerialize,
{
    let frame = encode_frame(msg)?;
    io.write_all(&frame).await?;
    io.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::types::{Request, RequestQuery, Response};

    #[test]
    fn test_frame_layout() {
        let frame = encode_frame(&Request::Flush).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
        assert_eq!(frame[4], PROTOCOL_VERSION);
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut frame = encode_frame(&Request::Commit).unwrap();
        frame[4] = PROTOCOL_VERSION + 1;
        let err = decode_body::<Request>(&frame[4..]).unwrap_err();
        assert!(matches!(err, AbciError::VersionMismatch { .. }));
    }

    #[test]
    fn test_empty_body_rejected() {
        assert!(decode_body::<Request>(&[]).is_err());
    }

    #[tokio::test]
    async fn test_stream_roundtrip_then_eof() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        let req = Request::Query(RequestQuery {
            path: "store/key".into(),
            data: vec![1, 2, 3],
            height: 0,
        });
        write_frame(&mut a, &req).await.unwrap();
        drop(a);

        let got: Option<Request> = read_frame(&mut b).await.unwrap();
        assert_eq!(got, Some(req));
        let eof: Option<Request> = read_frame(&mut b).await.unwrap();
        assert!(eof.is_none());
    }

    #[tokio::test]
    async fn test_oversized_length_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes())
            .await
            .unwrap();
        let err = read_frame::<_, Response>(&mut b).await.unwrap_err();
        assert!(matches!(err, AbciError::FrameTooLarge { .. }));
    }

    proptest! {
        #[test]
        fn prop_arbitrary_bodies_never_panic(body in prop::collection::vec(any::<u8>(), 0..256)) {
            let _ = decode_body::<Request>(&body);
            let _ = decode_body::<Response>(&body);
        }

        #[test]
        fn prop_truncated_query_frame_rejected(
            data in prop::collection::vec(any::<u8>(), 1..64),
            cut in 1usize..64,
        ) {
            let frame = encode_frame(&Request::Query(RequestQuery {
                path: "store/key".into(),
                data,
                height: 0,
            }))
            .unwrap();
            let body = &frame[4..];
            let keep = body.len().saturating_sub(cut).max(1);
            prop_assert!(decode_body::<Request>(&body[..keep]).is_err());
        }
    }
}
