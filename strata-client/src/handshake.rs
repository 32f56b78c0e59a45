//! Drives the `strata_mtproto::authentication` steps over a framed stream.

use std::io;

use strata_crypto::rsa;
use strata_mtproto::authentication::{self, Answer, Finished};
use strata_mtproto::{PlainSession, UnpackError};
use strata_tl_types::{RemoteCall, functions};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

use crate::errors::InvocationError;
use crate::transport::{FrameReader, FrameWriter};

/// How many `dh_gen_retry` answers are accepted before giving up.
pub const MAX_DH_ATTEMPTS: usize = 5;

impl From<UnpackError> for InvocationError {
    fn from(e: UnpackError) -> Self {
        match e {
            UnpackError::Decode(e) => Self::Deserialize(e),
            UnpackError::Frame(e) => Self::Io(io::Error::new(io::ErrorKind::InvalidData, e)),
        }
    }
}

async fn exchange<R, W, C>(
    plain: &mut PlainSession,
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    call: &C,
) -> Result<C::Return, InvocationError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    C: RemoteCall,
{
    writer.send(&plain.pack(call)).await?;
    let frame = reader.recv().await?;
    Ok(plain.unpack::<C>(&frame)?)
}

/// Run the whole key exchange and return the new key.
pub async fn perform<R, W>(
    reader: &mut FrameReader<R>,
    writer: &mut FrameWriter<W>,
    keys: &[rsa::Key],
) -> Result<Finished, InvocationError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut plain = PlainSession::new();

    let (req, state) = authentication::step1()?;
    let res_pq = exchange(&mut plain, reader, writer, &req).await?;

    let (req, state) = authentication::step2(state, res_pq, keys)?;
    let dh_params = exchange(&mut plain, reader, writer, &req).await?;

    let (mut req, mut state) = authentication::step3(state, dh_params)?;
    for attempt in 1..=MAX_DH_ATTEMPTS {
        let answer = exchange::<_, _, functions::SetClientDhParams>(&mut plain, reader, writer, &req).await?;
        match authentication::finish(state, answer)? {
            Answer::Done(done) => {
                info!("[strata] auth key ready (time offset {}s)", done.time_offset);
                return Ok(done);
            }
            Answer::Retry(next_req, next_state) => {
                debug!("[strata] dh_gen_retry, attempt {attempt}");
                req = next_req;
                state = next_state;
            }
        }
    }
    Err(authentication::Error::DhGenFail.into())
}
