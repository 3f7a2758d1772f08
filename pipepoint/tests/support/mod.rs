#![allow(dead_code)]

use pipepoint::{Exchange, Handler, Hook, Point, handler_fn};
use std::cell::RefCell;
use std::rc::Rc;

/// String requests, string responses, string errors.
pub struct Text;

impl Exchange for Text {
    type Request = String;
    type Response = String;
    type Error = String;
}

pub type Outcome = std::result::Result<String, String>;

/// Shared log of what the stages saw, in order.
pub type Trace = Rc<RefCell<Vec<String>>>;

pub fn trace() -> Trace {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(trace: &Trace) -> Vec<String> {
    trace.borrow().clone()
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Stage pushing `name>req` for requests and `name<res` for responses, forwarding both.
pub fn recorder(name: &'static str, trace: &Trace) -> impl Handler<Text> + 'static {
    let trace = Rc::clone(trace);
    handler_fn(name, move |point: &Point<Text>| {
        let requests = Rc::clone(&trace);
        point.on(Hook::request(move |req, next| {
            requests.borrow_mut().push(format!("{name}>{req}"));
            next.resume(req)
        }))?;
        let responses = Rc::clone(&trace);
        point.on(Hook::response(move |res, next| {
            responses.borrow_mut().push(format!("{name}<{res}"));
            next.resume(res)
        }))?;
        Ok(())
    })
}

/// Transport answering every request with `reply(request)` right away.
pub fn transport(reply: fn(String) -> Outcome) -> impl Handler<Text> + 'static {
    handler_fn("transport", move |point: &Point<Text>| {
        point.on(Hook::request(move |req, next| match reply(req) {
            Ok(res) => next.point().respond(res).map(drop),
            Err(err) => next.point().throw(err),
        }))?;
        Ok(())
    })
}

/// Callback for [`Point::request_with`] storing the outcome into the returned slot.
pub fn capture() -> (
    Rc<RefCell<Option<Outcome>>>,
    impl FnOnce(Outcome) + 'static,
) {
    let slot = Rc::new(RefCell::new(None));
    let sink = Rc::clone(&slot);
    (slot, move |outcome: Outcome| *sink.borrow_mut() = Some(outcome))
}
