/*!
Stub broker MQTT minimal pour tests de publication

Accepte les connexions MQTT 3.1.1 sur un port éphémère, acquitte
CONNECT / PUBLISH (QoS 1) / PINGREQ et capture chaque PUBLISH reçu.
Pas de routage vers des abonnés: seul l'agent émetteur est testé.
*/

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Message PUBLISH capturé par le stub
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPublish {
    pub topic: String,
    pub qos: u8,
    pub retain: bool,
    pub payload: Vec<u8>,
}

impl CapturedPublish {
    /// Payload décodé en JSON
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.payload)
    }
}

/// Broker simulé, arrêté au drop
pub struct MqttBrokerStub {
    port: u16,
    published: Arc<Mutex<Vec<CapturedPublish>>>,
    server: JoinHandle<()>,
}

impl MqttBrokerStub {
    pub async fn start() -> anyhow::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let published = Arc::new(Mutex::new(Vec::new()));

        let capture = published.clone();
        let server = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let capture = capture.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_client(stream, capture).await {
                        tracing::debug!("mqtt stub client closed: {}", e);
                    }
                });
            }
        });

        tracing::debug!("mqtt stub listening on 127.0.0.1:{}", port);
        Ok(Self {
            port,
            published,
            server,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Messages reçus, dans l'ordre d'arrivée
    pub fn published(&self) -> Vec<CapturedPublish> {
        self.published.lock().clone()
    }

    /// Attend au moins `count` messages, au plus `timeout`
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<CapturedPublish> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let published = self.published();
            if published.len() >= count || tokio::time::Instant::now() >= deadline {
                return published;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

impl Drop for MqttBrokerStub {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn serve_client(
    mut stream: TcpStream,
    published: Arc<Mutex<Vec<CapturedPublish>>>,
) -> anyhow::Result<()> {
    loop {
        let header = stream.read_u8().await?;
        let length = read_remaining_length(&mut stream).await?;
        let mut body = vec![0u8; length];
        stream.read_exact(&mut body).await?;

        match header >> 4 {
            // CONNECT -> CONNACK accepté
            1 => stream.write_all(&[0x20, 0x02, 0x00, 0x00]).await?,
            3 => {
                let message = decode_publish(header, &body)?;
                let packet_id = message.1;
                published.lock().push(message.0);
                if let Some(id) = packet_id {
                    let [hi, lo] = id.to_be_bytes();
                    stream.write_all(&[0x40, 0x02, hi, lo]).await?;
                }
            }
            // PINGREQ
            12 => stream.write_all(&[0xD0, 0x00]).await?,
            // DISCONNECT
            14 => return Ok(()),
            _ => {}
        }
    }
}

async fn read_remaining_length(stream: &mut TcpStream) -> anyhow::Result<usize> {
    let mut value = 0usize;
    let mut shift = 0;
    loop {
        let byte = stream.read_u8().await?;
        value |= ((byte & 0x7F) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift > 21 {
            anyhow::bail!("malformed remaining length");
        }
    }
}

fn decode_publish(header: u8, body: &[u8]) -> anyhow::Result<(CapturedPublish, Option<u16>)> {
    let qos = (header >> 1) & 0x03;
    let retain = header & 0x01 == 1;

    if body.len() < 2 {
        anyhow::bail!("truncated PUBLISH");
    }
    let topic_len = u16::from_be_bytes([body[0], body[1]]) as usize;
    let mut offset = 2 + topic_len;
    let topic = body
        .get(2..offset)
        .ok_or_else(|| anyhow::anyhow!("truncated PUBLISH topic"))?;
    let topic = String::from_utf8(topic.to_vec())?;

    let packet_id = if qos > 0 {
        let id = body
            .get(offset..offset + 2)
            .ok_or_else(|| anyhow::anyhow!("missing packet id"))?;
        offset += 2;
        Some(u16::from_be_bytes([id[0], id[1]]))
    } else {
        None
    };

    let message = CapturedPublish {
        topic,
        qos,
        retain,
        payload: body[offset..].to_vec(),
    };
    Ok((message, packet_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_publish_qos1() {
        // topic "a/b", packet id 7, payload "{}"
        let body = [0x00, 0x03, b'a', b'/', b'b', 0x00, 0x07, b'{', b'}'];
        let (message, id) = decode_publish(0x32, &body).unwrap();
        assert_eq!(message.topic, "a/b");
        assert_eq!(message.qos, 1);
        assert!(!message.retain);
        assert_eq!(message.payload, b"{}");
        assert_eq!(id, Some(7));
    }

    #[test]
    fn test_decode_publish_rejects_truncated_topic() {
        assert!(decode_publish(0x30, &[0x00, 0x09, b'a']).is_err());
    }
}
