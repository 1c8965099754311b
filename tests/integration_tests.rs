use gridcalc::{ComputeServer, ServerConfig, ServerError};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

#[cfg(test)]
mod integration_tests {
    use super::*;

    const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

    fn test_config() -> ServerConfig {
        ServerConfig::new()
            .with_bind_address(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(0)
            .with_worker_threads(4)
    }

    async fn start_test_server(
        config: ServerConfig,
    ) -> Result<(SocketAddr, tokio::task::JoinHandle<Result<(), ServerError>>), ServerError> {
        let mut server = ComputeServer::new(config)?;
        let addr = server.bind().await?;
        let handle = tokio::spawn(async move { server.start().await });
        Ok((addr, handle))
    }

    struct TestClient {
        lines: Lines<BufReader<OwnedReadHalf>>,
        writer: OwnedWriteHalf,
    }

    impl TestClient {
        async fn connect(addr: SocketAddr) -> Self {
            let stream = TcpStream::connect(addr).await.unwrap();
            let (read_half, writer) = stream.into_split();
            Self {
                lines: BufReader::new(read_half).lines(),
                writer,
            }
        }

        async fn send(&mut self, message: &str) {
            self.writer
                .write_all(format!("{}\n", message).as_bytes())
                .await
                .unwrap();
        }

        async fn recv(&mut self) -> Option<String> {
            timeout(REPLY_TIMEOUT, self.lines.next_line())
                .await
                .expect("reply timed out")
                .unwrap()
        }

        async fn request(&mut self, message: &str) -> String {
            self.send(message).await;
            self.recv().await.expect("connection closed early")
        }
    }

    fn fields(reply: &str) -> Vec<&str> {
        reply.split(';').collect()
    }

    fn assert_ok(reply: &str, value: &str) {
        let parts = fields(reply);
        assert_eq!(parts.len(), 3, "unexpected reply {}", reply);
        assert_eq!(parts[0], "OK");
        let seconds: f64 = parts[1].parse().unwrap();
        assert!(seconds >= 0.0);
        assert_eq!(parts[1].split('.').nth(1).map(str::len), Some(3));
        assert_eq!(parts[2], value);
    }

    // ==========================
    // Computations
    // ==========================
    #[tokio::test]
    async fn test_count_and_aggregates() {
        let (addr, _handle) = start_test_server(test_config()).await.unwrap();
        let mut client = TestClient::connect(addr).await;

        assert_ok(&client.request("COUNT_GRID;x:0:1:3").await, "4");
        assert_ok(&client.request("MAX_GRID;x:0:1:2;x+1").await, "3.000000");
        assert_ok(&client.request("MIN_LIST;x:0:1:2,y:0:2:4;x-y").await, "-2.000000");
        assert_ok(&client.request("AVG_GRID;x:1:1:4;x^2").await, "7.500000");
        assert_ok(&client.request("MAX_GRID;a:0:1:2,b:0:1:1;2+3*4").await, "14.000000");
        assert_ok(&client.request("MAX_GRID;a:0:1:2;2+(3*4)").await, "14.000000");
    }

    #[tokio::test]
    async fn test_non_finite_values_are_skipped() {
        let (addr, _handle) = start_test_server(test_config()).await.unwrap();
        let mut client = TestClient::connect(addr).await;

        assert_ok(&client.request("MIN_GRID;x:-1:1:1;1/x").await, "-1.000000");
        assert_ok(&client.request("AVG_GRID;x:0:1:0;0/x").await, "0.000000");

        // the running total overflows but the average does not
        let reply = client.request("AVG_GRID;x:0:1:1;10^308").await;
        let parts = fields(&reply);
        assert_eq!(parts[0], "OK", "unexpected reply {}", reply);
        let average: f64 = parts[2].parse().unwrap();
        assert!(average.is_finite());
        assert!((average / 1e308 - 1.0).abs() < 1e-12);
    }

    // ==========================
    // Error replies
    // ==========================
    #[tokio::test]
    async fn test_error_tags() {
        let (addr, _handle) = start_test_server(test_config()).await.unwrap();
        let mut client = TestClient::connect(addr).await;

        let cases = [
            ("FOO", "ERR;(IllegalCommand) Unknown request type"),
            ("MAX_GRID", "ERR;(NotEnoughArguments) Invalid message format"),
            ("MAX_GRID;x:0:1:2", "ERR;(NotEnoughArguments) Invalid message format"),
            ("MAX_GRID;x:0:0:2;x", "ERR;(InvalidStep) Invalid Step"),
            ("MAX_GRID;x:3:1:2;x", "ERR;(InvalidRange) Invalid Range"),
            (
                "MAX_GRID;X:0:1:2;X",
                "ERR;(InvalidExpression) Invalid Variable Value Function",
            ),
            ("MAX_GRID;x:0:1:2;y+1", "ERR;(InvalidExpression) Invalid Expression"),
            ("MAX_GRID;x:0:1:2;x + 1", "ERR;(InvalidExpression) Invalid Expression"),
            (
                "COUNT_GRID;x:0:0.0000001:9999999999999999999999",
                "ERR;(IllegalArgument) The value space is too large",
            ),
            (
                "MAX_GRID;x:0:1:2;x+",
                "ERR;(InvalidExpression) The expression is not in a valid format",
            ),
            (
                "AVG_LIST;x:0:1:2,y:0:1:1;x",
                "ERR;(IllegalArgument) The range of the variables must have the same size",
            ),
            ("STAT_FOO", "ERR;(IllegalCommand) Unknown request type"),
        ];
        for (request, expected) in cases {
            assert_eq!(client.request(request).await, expected, "request {}", request);
        }
    }

    // ==========================
    // Stats
    // ==========================
    #[tokio::test]
    async fn test_fresh_server_stats_are_zero() {
        let (addr, _handle) = start_test_server(test_config()).await.unwrap();
        let mut client = TestClient::connect(addr).await;

        assert_ok(&client.request("STAT_REQS").await, "0");
        assert_ok(&client.request("STAT_AVG_TIME").await, "0.000000");
        assert_ok(&client.request("STAT_MAX_TIME").await, "0.000000");
    }

    #[tokio::test]
    async fn test_stats_count_only_successes_across_connections() {
        let (addr, _handle) = start_test_server(test_config()).await.unwrap();
        let mut first = TestClient::connect(addr).await;
        let mut second = TestClient::connect(addr).await;

        first.request("COUNT_GRID;x:0:1:3").await;
        second.request("MAX_GRID;x:0:1:2;x").await;
        first.request("AVG_LIST;x:0:1:2,y:0:1:1;x").await;
        second.request("FOO").await;

        assert_ok(&first.request("STAT_REQS").await, "2");
        assert_ok(&second.request("STAT_REQS").await, "2");
    }

    // ==========================
    // Ordering and lifecycle
    // ==========================
    #[tokio::test]
    async fn test_pipelined_requests_are_answered_in_order() {
        let (addr, _handle) = start_test_server(test_config()).await.unwrap();
        let mut client = TestClient::connect(addr).await;

        // a slow computation followed by fast replies that must not overtake it
        client.send("MAX_GRID;x:0:1:300,y:0:1:300;x*y").await;
        client.send("FOO").await;
        client.send("COUNT_LIST;x:0:1:9").await;
        client.send("MAX_GRID;x:0:1:1;x+").await;

        assert_ok(&client.recv().await.unwrap(), "90000.000000");
        assert_eq!(
            client.recv().await.unwrap(),
            "ERR;(IllegalCommand) Unknown request type"
        );
        assert_ok(&client.recv().await.unwrap(), "10");
        assert_eq!(
            client.recv().await.unwrap(),
            "ERR;(InvalidExpression) The expression is not in a valid format"
        );
    }

    #[tokio::test]
    async fn test_bye_acks_and_closes() {
        let (addr, _handle) = start_test_server(test_config()).await.unwrap();
        let mut client = TestClient::connect(addr).await;

        client.send("COUNT_GRID;x:0:1:1").await;
        client.send("BYE").await;
        assert_ok(&client.recv().await.unwrap(), "2");
        assert_eq!(client.recv().await.unwrap(), "OK");
        assert_eq!(client.recv().await, None);
    }

    #[tokio::test]
    async fn test_idle_connection_is_closed() {
        let config = test_config().with_idle_timeout(Duration::from_millis(100));
        let (addr, _handle) = start_test_server(config).await.unwrap();
        let mut client = TestClient::connect(addr).await;

        assert_eq!(client.recv().await, None);
    }

    #[tokio::test]
    async fn test_overlong_line_keeps_connection_open() {
        let config = test_config().with_max_line_length(32);
        let (addr, _handle) = start_test_server(config).await.unwrap();
        let mut client = TestClient::connect(addr).await;

        let long = format!("MAX_GRID;x:0:1:2;{}", "x+".repeat(40) + "x");
        let reply = client.request(&long).await;
        assert!(reply.starts_with("ERR;(Exception) "), "unexpected reply {}", reply);

        assert_ok(&client.request("COUNT_GRID;x:0:1:3").await, "4");
    }

    #[tokio::test]
    async fn test_concurrent_clients() {
        let (addr, _handle) = start_test_server(test_config()).await.unwrap();

        let handles: Vec<_> = (0..8u32)
            .map(|i| {
                tokio::spawn(async move {
                    let mut client = TestClient::connect(addr).await;
                    let reply = client.request(&format!("COUNT_GRID;x:0:1:{}", i)).await;
                    (i, reply)
                })
            })
            .collect();

        for handle in handles {
            let (i, reply) = handle.await.unwrap();
            assert_ok(&reply, &(i + 1).to_string());
        }
    }
}
