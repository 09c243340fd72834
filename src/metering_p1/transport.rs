use super::P1Error;
use crate::config::{P1Config, P1Transport};
use log::info;
use tokio::io::{AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio_serial::SerialPortBuilderExt;

pub type P1Stream = BufReader<Box<dyn AsyncRead + Send + Unpin>>;

/// Opens the byte stream the P1 telegrams arrive on.
pub async fn open(config: &P1Config) -> Result<P1Stream, P1Error> {
    let stream: Box<dyn AsyncRead + Send + Unpin> = match config.transport {
        P1Transport::Serial => Box::new(open_serial(&config.device, config.baud_rate)?),
        P1Transport::Tcp => {
            let host = config.host.as_deref()
                .ok_or_else(|| P1Error::Transport("p1.host is required for the Tcp transport".to_string()))?;
            let port = config.port
                .ok_or_else(|| P1Error::Transport("p1.port is required for the Tcp transport".to_string()))?;

            info!("Connecting to P1 bridge at {host}:{port}");
            Box::new(TcpStream::connect((host, port)).await?)
        }
        P1Transport::Mqtt => {
            return Err(P1Error::Transport("the Mqtt transport is not a byte stream".to_string()));
        }
    };

    Ok(BufReader::new(stream))
}

/* DSMR 4+ uses 115200 8N1, the inverted signal is handled by the cable */
fn open_serial(device: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream, P1Error> {
    info!("Opening P1 serial port {device} at {baud_rate} baud");

    tokio_serial::new(device, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .stop_bits(tokio_serial::StopBits::One)
        .parity(tokio_serial::Parity::None)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| P1Error::Serial(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metering_p1::line_reader::{LineEvent, LineReader};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    fn p1_config(transport: P1Transport) -> P1Config {
        P1Config {
            transport,
            device: "/dev/does-not-exist".to_string(),
            baud_rate: 115200,
            host: None,
            port: None,
            max_line_length: 250,
            reconnect_delay: 1,
            meter_name: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_tcp_requires_host_and_port() {
        let result = open(&p1_config(P1Transport::Tcp)).await;
        assert!(matches!(result, Err(P1Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_mqtt_is_not_a_stream() {
        assert!(matches!(open(&p1_config(P1Transport::Mqtt)).await, Err(P1Error::Transport(_))));
    }

    #[tokio::test]
    async fn test_missing_serial_device() {
        assert!(matches!(open(&p1_config(P1Transport::Serial)).await, Err(P1Error::Serial(_))));
    }

    #[tokio::test]
    async fn test_tcp_stream_delivers_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"/KFM5KAIFA-METER\r\n").await.unwrap();
        });

        let mut config = p1_config(P1Transport::Tcp);
        config.host = Some("127.0.0.1".to_string());
        config.port = Some(port);

        let stream = open(&config).await.unwrap();
        let mut reader = LineReader::new(stream, 250);
        assert_eq!(reader.next_event().await.unwrap(), Some(LineEvent::Line(b"/KFM5KAIFA-METER\r\n".to_vec())));
    }
}
