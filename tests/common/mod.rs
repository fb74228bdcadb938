//! Fake AMQP 0-9-1 broker for offline tests
//!
//! Speaks the connection-class handshake over any async stream and records
//! what the client sent, so tests can check what went over the wire.

#![allow(dead_code)]

use amqp_bootstrap::protocol::constants::{class, method, reply};
use amqp_bootstrap::protocol::{
    decode_frame, encode_frame, CloseReason, FieldTable, FieldValue, Frame, Method, Tuning,
    PROTOCOL_HEADER,
};
use bytes::{Buf, BytesMut};
use std::io;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;

/// How the fake broker behaves
#[derive(Debug, Clone)]
pub struct BrokerScript {
    pub user: String,
    pub password: String,
    pub vhosts: Vec<String>,
    pub tune: Tuning,
    /// Refuse bad credentials with `connection.close 403`; otherwise drop the socket
    pub refuse_with_close: bool,
}

impl Default for BrokerScript {
    fn default() -> Self {
        Self {
            user: "guest".into(),
            password: "guest".into(),
            vhosts: vec!["/".into()],
            tune: Tuning {
                channel_max: 2047,
                frame_max: 131_072,
                heartbeat: 60,
            },
            refuse_with_close: true,
        }
    }
}

/// What one client connection sent
#[derive(Debug, Clone, Default)]
pub struct Observed {
    pub client_properties: FieldTable,
    pub mechanism: String,
    pub response: Vec<u8>,
    pub tune_ok: Option<Tuning>,
    pub vhost: Option<String>,
    pub opened: bool,
    pub heartbeats: u32,
    pub closed_by_client: bool,
}

impl Observed {
    /// `connection_name` client property, if sent
    pub fn connection_name(&self) -> Option<String> {
        self.client_properties
            .iter()
            .find(|(k, _)| k == "connection_name")
            .and_then(|(_, v)| v.as_str())
            .map(str::to_string)
    }
}

pub type Record = Arc<Mutex<Vec<Observed>>>;

/// Fake broker listening on a local port
pub struct FakeBroker {
    pub port: u16,
    record: Record,
}

impl FakeBroker {
    /// Start accepting plain TCP connections on an ephemeral port
    pub async fn spawn(script: BrokerScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self::serve(listener, script)
    }

    /// Serve connections on an existing listener
    pub fn serve(listener: TcpListener, script: BrokerScript) -> Self {
        let port = listener.local_addr().unwrap().port();
        let record = Record::default();
        let shared = record.clone();
        tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let (script, record) = (script.clone(), shared.clone());
                tokio::spawn(async move {
                    let _ = serve_connection(socket, &script, &record).await;
                });
            }
        });
        Self { port, record }
    }

    /// Everything observed so far, one entry per connection
    pub fn observed(&self) -> Vec<Observed> {
        self.record.lock().unwrap().clone()
    }
}

/// Run the broker side of one connection on `stream`
pub async fn serve_connection<S>(mut stream: S, script: &BrokerScript, record: &Record) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 8];
    stream.read_exact(&mut header).await?;
    if header != PROTOCOL_HEADER {
        stream.write_all(&PROTOCOL_HEADER).await?;
        return Ok(());
    }

    let index = {
        let mut all = record.lock().unwrap();
        all.push(Observed::default());
        all.len() - 1
    };
    let update = |f: &dyn Fn(&mut Observed)| f(&mut record.lock().unwrap()[index]);

    let mut buf = BytesMut::with_capacity(4096);
    send(
        &mut stream,
        &Method::Start {
            version_major: 0,
            version_minor: 9,
            server_properties: vec![
                ("product".into(), FieldValue::string("FakeRabbit")),
                ("version".into(), FieldValue::string("3.13.0")),
            ],
            mechanisms: "AMQPLAIN PLAIN".into(),
            locales: "en_US".into(),
        },
    )
    .await?;

    let Some(Method::StartOk {
        client_properties,
        mechanism,
        response,
        ..
    }) = read_method(&mut stream, &mut buf).await?
    else {
        return Ok(());
    };
    let accepted = response == plain(&script.user, &script.password);
    update(&|o| {
        o.client_properties = client_properties.clone();
        o.mechanism = mechanism.clone();
        o.response = response.clone();
    });

    if !accepted {
        if script.refuse_with_close {
            let reason = CloseReason {
                reply_code: reply::ACCESS_REFUSED,
                reply_text: "ACCESS_REFUSED - Login was refused using authentication mechanism PLAIN".into(),
                class_id: class::CONNECTION,
                method_id: method::START_OK,
            };
            send(&mut stream, &Method::Close(reason)).await?;
            let _ = read_method(&mut stream, &mut buf).await;
        }
        return Ok(());
    }

    send(&mut stream, &Method::Tune(script.tune)).await?;

    let Some(Method::TuneOk(tuning)) = read_method(&mut stream, &mut buf).await? else {
        return Ok(());
    };
    update(&|o| o.tune_ok = Some(tuning));

    let Some(Method::Open { virtual_host }) = read_method(&mut stream, &mut buf).await? else {
        return Ok(());
    };
    let allowed = script.vhosts.contains(&virtual_host);
    update(&|o| o.vhost = Some(virtual_host.clone()));

    if !allowed {
        let reason = CloseReason {
            reply_code: reply::NOT_ALLOWED,
            reply_text: format!("NOT_ALLOWED - vhost {} not found", virtual_host),
            class_id: class::CONNECTION,
            method_id: method::OPEN,
        };
        send(&mut stream, &Method::Close(reason)).await?;
        let _ = read_method(&mut stream, &mut buf).await;
        return Ok(());
    }

    update(&|o| o.opened = true);
    send(&mut stream, &Method::OpenOk).await?;

    loop {
        match read_frame(&mut stream, &mut buf).await? {
            Some(Frame::Heartbeat) => update(&|o| o.heartbeats += 1),
            Some(Frame::Method {
                method: Method::Close(_),
                ..
            }) => {
                update(&|o| o.closed_by_client = true);
                send(&mut stream, &Method::CloseOk).await?;
                return Ok(());
            }
            Some(_) => {}
            None => return Ok(()),
        }
    }
}

/// SASL PLAIN response for `user` / `password`
pub fn plain(user: &str, password: &str) -> Vec<u8> {
    format!("\0{}\0{}", user, password).into_bytes()
}

async fn send<S: AsyncWrite + Unpin>(stream: &mut S, msg: &Method) -> io::Result<()> {
    stream.write_all(&encode_frame(0, msg)?).await?;
    stream.flush().await
}

async fn read_method<S: AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut BytesMut,
) -> io::Result<Option<Method>> {
    loop {
        match read_frame(stream, buf).await? {
            Some(Frame::Method { method, .. }) => return Ok(Some(method)),
            Some(_) => continue,
            None => return Ok(None),
        }
    }
}

/// Next frame, or `None` once the client hangs up
async fn read_frame<S: AsyncRead + Unpin>(
    stream: &mut S,
    buf: &mut BytesMut,
) -> io::Result<Option<Frame>> {
    loop {
        match decode_frame(&buf[..]) {
            Ok((frame, consumed)) => {
                buf.advance(consumed);
                return Ok(Some(frame));
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {}
            Err(e) => return Err(e),
        }
        if stream.read_buf(buf).await? == 0 {
            return Ok(None);
        }
    }
}
