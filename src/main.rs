use rampart::config::ServerConfig;
use rampart::http::handler::{Handler, HandlerResult};
use rampart::http::request::Request;
use rampart::http::response::Response;
use rampart::server::ServerBuilder;

struct HelloHandler;

impl Handler for HelloHandler {
    fn get(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        response.set_content_type("text/plain").write("Hello from rampart\n");
        Ok(())
    }
}

struct EchoHandler;

impl Handler for EchoHandler {
    fn post(&self, request: &Request, response: &mut Response) -> HandlerResult {
        response
            .set_content_type("application/octet-stream")
            .write(&request.body);
        Ok(())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = ServerConfig::load();

    let server = ServerBuilder::with_config(cfg)
        .route("/", HelloHandler)
        .route("/echo", EchoHandler)
        .build()?;

    server.start_and_wait()?;
    Ok(())
}
