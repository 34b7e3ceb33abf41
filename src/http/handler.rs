use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::error::HttpError;
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};

pub type HandlerResult = Result<(), HttpError>;

/// Per-verb entry points invoked by the dispatcher.
///
/// Handlers are stateless values shared across requests and worker threads.
/// Every verb defaults to 501 Not Implemented; implement the ones a route
/// supports.
pub trait Handler: Send + Sync {
    fn get(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        not_implemented(response)
    }

    fn post(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        not_implemented(response)
    }

    fn put(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        not_implemented(response)
    }

    fn delete(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        not_implemented(response)
    }

    fn head(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        not_implemented(response)
    }

    fn options(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        not_implemented(response)
    }

    fn patch(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        not_implemented(response)
    }
}

fn not_implemented(response: &mut Response) -> HandlerResult {
    response.set_status(StatusCode::NotImplemented).write(" ");
    Ok(())
}

/// Routes a request to the matching verb entry point and converts every
/// failure mode into a response, so nothing escapes to the worker thread.
///
/// `TRACE` and `CONNECT` are answered with 405 without touching the handler.
pub fn dispatch(handler: &dyn Handler, request: &Request, response: &mut Response) {
    let outcome = catch_unwind(AssertUnwindSafe(|| match request.method {
        Method::GET => handler.get(request, response),
        Method::POST => handler.post(request, response),
        Method::PUT => handler.put(request, response),
        Method::DELETE => handler.delete(request, response),
        Method::HEAD => handler.head(request, response),
        Method::OPTIONS => handler.options(request, response),
        Method::PATCH => handler.patch(request, response),
        Method::TRACE | Method::CONNECT => {
            tracing::warn!(method = request.method.as_str(), "refusing unsupported http method");
            response.reset();
            response
                .set_keep_alive(false)
                .set_status(StatusCode::MethodNotAllowed);
            Ok(())
        }
    }));

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            tracing::error!(
                status = err.status.as_u16(),
                path = %request.path,
                error = %err,
                "handler reported an error"
            );
            let keep_alive = !err.closes_connection() && request.keep_alive();
            response.reset();
            response
                .set_keep_alive(keep_alive)
                .set_status(err.status)
                .write(err.message.as_bytes());
        }
        Err(panic) => {
            let detail = panic_message(panic);
            tracing::error!(path = %request.path, panic = %detail, "handler panicked");
            response.reset();
            response
                .set_keep_alive(request.keep_alive())
                .set_status(StatusCode::InternalServerError)
                .write(detail.as_bytes());
        }
    }
}

pub(crate) fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

/// Answers for paths no route matched. Routing failures close the
/// connection regardless of the request's keep-alive preference.
pub struct NotFoundHandler;

impl NotFoundHandler {
    fn not_found(&self, request: &Request, response: &mut Response) -> HandlerResult {
        response
            .set_keep_alive(false)
            .set_status(StatusCode::NotFound)
            .set_content_type("text/plain")
            .write(format!("Requested URL {} was not found\n", request.path));
        Ok(())
    }
}

impl Handler for NotFoundHandler {
    fn get(&self, request: &Request, response: &mut Response) -> HandlerResult {
        self.not_found(request, response)
    }

    fn post(&self, request: &Request, response: &mut Response) -> HandlerResult {
        self.not_found(request, response)
    }

    fn put(&self, request: &Request, response: &mut Response) -> HandlerResult {
        self.not_found(request, response)
    }

    fn delete(&self, request: &Request, response: &mut Response) -> HandlerResult {
        self.not_found(request, response)
    }

    fn head(&self, request: &Request, response: &mut Response) -> HandlerResult {
        self.not_found(request, response)
    }

    fn options(&self, request: &Request, response: &mut Response) -> HandlerResult {
        self.not_found(request, response)
    }

    fn patch(&self, request: &Request, response: &mut Response) -> HandlerResult {
        self.not_found(request, response)
    }
}

/// Grants permission to send a request body: answers the early
/// `Expect: 100-continue` yield for the verbs that carry one.
pub struct ContinueHandler;

impl Handler for ContinueHandler {
    fn post(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        response.set_status(StatusCode::Continue);
        Ok(())
    }

    fn put(&self, _request: &Request, response: &mut Response) -> HandlerResult {
        response.set_status(StatusCode::Continue);
        Ok(())
    }
}
