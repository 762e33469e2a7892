//! Integration tests for motorhead-chat.
//! Each test stands up throwaway HTTP servers on localhost in place of Motorhead and the
//! model backend.

#[cfg(test)]
mod tests {
    use motorhead_chat::memory::MotorheadOptions;
    use motorhead_chat::{
        CallbackEvent, CallbackHandler, ChatOpenAi, ChatPromptTemplate, ConversationChain, Memory,
        MotorheadMemory, OpenAi,
    };
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio::task::JoinHandle;

    /// One request as the fake server saw it.
    #[derive(Debug)]
    struct Recorded {
        head: String,
        body: String,
    }

    impl Recorded {
        fn request_line(&self) -> &str {
            self.head.lines().next().unwrap_or_default()
        }

        fn json(&self) -> serde_json::Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    /// Serve one canned response per connection, in order, then stop.
    async fn serve(responses: Vec<String>) -> (String, JoinHandle<Vec<Recorded>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let mut recorded = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                recorded.push(read_request(&mut socket).await);
                socket.write_all(response.as_bytes()).await.unwrap();
                socket.shutdown().await.unwrap();
            }
            recorded
        });
        (url, handle)
    }

    async fn read_request(socket: &mut TcpStream) -> Recorded {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = socket.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending a full request");
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
        let length = head
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while buf.len() < header_end + length {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body = String::from_utf8_lossy(&buf[header_end..]).to_string();
        Recorded { head, body }
    }

    fn json_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn sse_response(tokens: &[&str]) -> String {
        let mut body = String::new();
        for token in tokens {
            body.push_str(&format!(
                "data: {}\n\n",
                serde_json::json!({
                    "id": "chatcmpl-1",
                    "object": "chat.completion.chunk",
                    "choices": [{"index": 0, "delta": {"content": token}, "finish_reason": null}]
                })
            ));
        }
        body.push_str("data: [DONE]\n\n");
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nConnection: close\r\n\r\n{body}"
        )
    }

    const OK_ACK: &str = r#"{"status":"Ok"}"#;

    #[derive(Default)]
    struct Tokens(Vec<String>);

    impl CallbackHandler for Tokens {
        fn handle(&mut self, event: CallbackEvent<'_>) {
            if let CallbackEvent::LlmNewToken(token) = event {
                self.0.push(token.to_string());
            }
        }
    }

    #[tokio::test]
    async fn init_loads_history_and_context() {
        let (url, server) = serve(vec![json_response(
            "200 OK",
            r#"{"messages":[{"role":"AI","content":"Ace of Spades."},{"role":"Human","content":"Best song?"}],"context":"We discussed guitars.","tokens":42}"#,
        )])
        .await;

        let mut memory = MotorheadMemory::new(&url, "ozzy6666").unwrap();
        memory.init().await.unwrap();

        assert_eq!(memory.context(), Some("We discussed guitars."));
        assert_eq!(memory.tokens(), Some(42));
        let history = memory.load_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "Best song?");
        assert_eq!(history[1].content, "Ace of Spades.");

        let requests = server.await.unwrap();
        assert_eq!(
            requests[0].request_line(),
            "GET /sessions/ozzy6666/memory HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn save_context_posts_the_turn() {
        let (url, server) = serve(vec![
            json_response("200 OK", r#"{"messages":[],"context":"NONE"}"#),
            json_response("200 OK", OK_ACK),
        ])
        .await;

        let mut memory = MotorheadMemory::new(&url, "s1").unwrap();
        memory.init().await.unwrap();
        assert_eq!(memory.context(), None);
        memory.save_context("hi", "hello!").await.unwrap();
        assert_eq!(memory.history().len(), 2);

        let requests = server.await.unwrap();
        assert_eq!(
            requests[1].request_line(),
            "POST /sessions/s1/memory HTTP/1.1"
        );
        assert_eq!(
            requests[1].json(),
            serde_json::json!({
                "messages": [
                    {"role": "Human", "content": "hi"},
                    {"role": "AI", "content": "hello!"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn clear_deletes_the_session() {
        let (url, server) = serve(vec![
            json_response("200 OK", r#"{"messages":[{"role":"Human","content":"x"}],"context":"c"}"#),
            json_response("200 OK", OK_ACK),
        ])
        .await;

        let mut memory = MotorheadMemory::new(&url, "s1").unwrap();
        memory.init().await.unwrap();
        memory.clear().await.unwrap();
        assert!(memory.history().is_empty());
        assert_eq!(memory.context(), None);

        let requests = server.await.unwrap();
        assert_eq!(
            requests[1].request_line(),
            "DELETE /sessions/s1/memory HTTP/1.1"
        );
    }

    #[tokio::test]
    async fn hosted_credentials_and_data_envelope() {
        let (url, server) = serve(vec![
            json_response(
                "200 OK",
                r#"{"data":{"messages":[{"role":"AI","content":"Ace of Spades."}],"context":"Lemmy"}}"#,
            ),
            json_response(
                "200 OK",
                r#"{"data":[{"role":"AI","content":"Ace of Spades.","dist":0.08}]}"#,
            ),
        ])
        .await;

        let options = MotorheadOptions {
            api_key: Some("metal-key".to_string()),
            client_id: Some("metal-client".to_string()),
            timeout: None,
        };
        let mut memory = MotorheadMemory::with_options(&url, "ozzy", options).unwrap();
        memory.init().await.unwrap();
        assert_eq!(memory.context(), Some("Lemmy"));
        assert_eq!(memory.history().len(), 1);

        let results = memory.retrieval("best song").await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "Ace of Spades.");
        assert_eq!(results[0].dist, 0.08);

        let requests = server.await.unwrap();
        for request in &requests {
            let head = request.head.to_ascii_lowercase();
            assert!(head.contains("x-metal-api-key: metal-key"), "{head}");
            assert!(head.contains("x-metal-client-id: metal-client"), "{head}");
        }
        assert_eq!(
            requests[1].request_line(),
            "POST /sessions/ozzy/retrieval HTTP/1.1"
        );
        assert_eq!(requests[1].json(), serde_json::json!({"text": "best song"}));
    }

    #[tokio::test]
    async fn self_hosted_retrieval_sends_no_credentials() {
        let (url, server) = serve(vec![json_response(
            "200 OK",
            r#"[{"role":"Human","content":"Who is Lemmy?","dist":0.2}]"#,
        )])
        .await;

        let memory = MotorheadMemory::new(&url, "s1").unwrap();
        let results = memory.retrieval("Lemmy").await.unwrap();
        assert_eq!(results[0].role, "Human");

        let requests = server.await.unwrap();
        assert!(!requests[0].head.to_ascii_lowercase().contains("x-metal"));
    }

    #[tokio::test]
    async fn server_error_surfaces() {
        let (url, server) = serve(vec![json_response("500 Internal Server Error", "redis down")]).await;
        let mut memory = MotorheadMemory::new(&url, "s1").unwrap();
        let err = memory.init().await.unwrap_err();
        assert!(err.is_server_error(), "{err}");
        assert!(err.to_string().contains("redis down"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn full_turn_streams_and_persists() {
        let (memory_url, memory_server) = serve(vec![
            json_response("200 OK", r#"{"messages":[],"context":"We discussed guitars."}"#),
            json_response("200 OK", OK_ACK),
        ])
        .await;
        let (model_url, model_server) = serve(vec![sse_response(&["Hel", "lo", "!"])]).await;

        let mut memory = MotorheadMemory::new(&memory_url, "davemustaine666").unwrap();
        memory.init().await.unwrap();
        let client = OpenAi::with_options(
            Some("sk-test".to_string()),
            Some(format!("{model_url}/v1")),
            None,
        )
        .unwrap();
        let llm = ChatOpenAi::new(client, "gpt-3.5-turbo");
        let mut chain = ConversationChain::new(memory, llm, ChatPromptTemplate::conversation());

        let mut tokens = Tokens::default();
        let output = chain.run("Who is Lemmy?", &mut tokens).await.unwrap();
        assert_eq!(output, "Hello!");
        assert_eq!(tokens.0, vec!["Hel", "lo", "!"]);
        assert_eq!(chain.memory().history().len(), 2);

        let model_requests = model_server.await.unwrap();
        let request = &model_requests[0];
        assert_eq!(request.request_line(), "POST /v1/chat/completions HTTP/1.1");
        assert!(
            request
                .head
                .to_ascii_lowercase()
                .contains("authorization: bearer sk-test")
        );
        let body = request.json();
        assert_eq!(body["stream"], true);
        assert_eq!(body["temperature"], 0.0);
        assert_eq!(body["model"], "gpt-3.5-turbo");
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "system");
        let system = messages[0]["content"].as_str().unwrap();
        assert_eq!(system.matches("We discussed guitars.").count(), 1);
        assert_eq!(messages[1], serde_json::json!({"role": "user", "content": "Who is Lemmy?"}));

        let memory_requests = memory_server.await.unwrap();
        assert_eq!(memory_requests.len(), 2);
        assert_eq!(memory_requests[1].json()["messages"][1]["content"], "Hello!");
    }

    #[tokio::test]
    async fn model_auth_failure_is_not_persisted() {
        let (memory_url, memory_server) =
            serve(vec![json_response("200 OK", r#"{"messages":[]}"#)]).await;
        let (model_url, model_server) = serve(vec![json_response(
            "401 Unauthorized",
            r#"{"error":{"type":"invalid_request_error","message":"Incorrect API key provided"}}"#,
        )])
        .await;

        let mut memory = MotorheadMemory::new(&memory_url, "s").unwrap();
        memory.init().await.unwrap();
        let client = OpenAi::with_options(Some("bad".to_string()), Some(model_url), None).unwrap();
        let mut chain = ConversationChain::new(
            memory,
            ChatOpenAi::new(client, "gpt-3.5-turbo"),
            ChatPromptTemplate::conversation(),
        );

        let err = chain.run("hi", &mut Tokens::default()).await.unwrap_err();
        assert!(err.is_authentication());
        assert_eq!(
            err.to_string(),
            "Authentication error: Incorrect API key provided"
        );
        assert!(chain.memory().history().is_empty());

        assert_eq!(memory_server.await.unwrap().len(), 1);
        model_server.await.unwrap();
    }
}
