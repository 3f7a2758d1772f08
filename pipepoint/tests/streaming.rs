//! Request and response streams.

mod support;

use pipepoint::{Hook, Pipeline, PipelineError, Point, handler_fn};
use support::{Text, Trace, entries, init_logger, trace};

/// Transport recording every request chunk, `eos` for the end of the stream.
fn chunk_sink(seen: &Trace) -> impl pipepoint::Handler<Text> + 'static {
    let seen = seen.clone();
    handler_fn("sink", move |point: &Point<Text>| {
        let head = seen.clone();
        point.on(Hook::request(move |req, _next| {
            head.borrow_mut().push(format!("head:{req}"));
            Ok(())
        }))?;
        let chunks = seen.clone();
        point.on(Hook::request_data(move |chunk, _next| {
            chunks
                .borrow_mut()
                .push(chunk.unwrap_or_else(|| "eos".to_owned()));
            Ok(())
        }))?;
        Ok(())
    })
}

#[test]
fn end_hook_fires_once_after_the_chunks() {
    init_logger();
    let seen = trace();
    let ends = seen.clone();
    let pipeline: Pipeline<Text> = Pipeline::new();
    pipeline
        .transport(chunk_sink(&seen))
        .add_back(handler_fn("watcher", move |point: &Point<Text>| {
            let ends = ends.clone();
            point.on(Hook::request_end(move |resume| {
                ends.borrow_mut().push("watcher:end".to_owned());
                resume.resume()
            }))?;
            Ok(())
        }));

    let mut writer = pipeline
        .create(None)
        .unwrap()
        .stream_request("upload".to_owned())
        .unwrap();
    writer.write("a".to_owned()).unwrap().write("b".to_owned()).unwrap();
    writer.end().unwrap();

    assert_eq!(
        entries(&seen),
        ["head:upload", "a", "b", "watcher:end", "eos"]
    );
}

#[test]
fn writing_after_end_fails() {
    let seen = trace();
    let pipeline: Pipeline<Text> = Pipeline::new();
    pipeline.transport(chunk_sink(&seen));

    let mut writer = pipeline
        .head()
        .stream_request("upload".to_owned())
        .unwrap();
    writer.write("a".to_owned()).unwrap();
    let point = writer.end().unwrap();
    assert!(writer.is_closed());
    assert!(point.context().unwrap().is_request_stream());

    let err = writer.write("b".to_owned()).unwrap_err();
    assert!(matches!(err, PipelineError::StreamClosed));
    assert!(matches!(writer.end(), Err(PipelineError::StreamClosed)));
    assert_eq!(entries(&seen), ["head:upload", "a", "eos"]);
}

#[test]
fn end_hook_also_runs_after_a_data_hook_passes_the_end_on() {
    let seen = trace();
    let log = seen.clone();
    let pipeline: Pipeline<Text> = Pipeline::new();
    pipeline
        .transport(chunk_sink(&seen))
        .add_back(handler_fn("both", move |point: &Point<Text>| {
            let chunks = log.clone();
            point.on(Hook::request_data(move |chunk, next| {
                chunks
                    .borrow_mut()
                    .push(format!("both:{}", chunk.as_deref().unwrap_or("none")));
                next.resume(chunk)
            }))?;
            let ends = log.clone();
            point.on(Hook::request_end(move |resume| {
                ends.borrow_mut().push("both:end".to_owned());
                resume.resume()
            }))?;
            Ok(())
        }));

    let mut writer = pipeline.head().stream_request("s".to_owned()).unwrap();
    writer.write("a".to_owned()).unwrap();
    writer.end().unwrap();

    assert_eq!(
        entries(&seen),
        ["head:s", "both:a", "a", "both:none", "both:end", "eos"]
    );
}

#[test]
fn response_stream_reaches_the_caller_chunk_by_chunk() {
    let pipeline: Pipeline<Text> = Pipeline::new();
    pipeline.transport(handler_fn("streamer", |point: &Point<Text>| {
        point.on(Hook::request(|req, next| {
            let mut writer = next.point().stream_response(format!("{req}:head"))?;
            writer.write("x".to_owned())?.write("y".to_owned())?;
            writer.end()?;
            Ok(())
        }))?;
        Ok(())
    }));

    let seen = trace();
    let point = pipeline.create(None).unwrap();
    let head = seen.clone();
    point
        .on(Hook::response(move |res, _next| {
            head.borrow_mut().push(res);
            Ok(())
        }))
        .unwrap();
    let chunks = seen.clone();
    point
        .on(Hook::response_data(move |chunk, _next| {
            chunks
                .borrow_mut()
                .push(chunk.unwrap_or_else(|| "eos".to_owned()));
            Ok(())
        }))
        .unwrap();
    point.request("get".to_owned()).unwrap();
    point.flush().unwrap();

    assert_eq!(entries(&seen), ["get:head", "x", "y", "eos"]);
    assert!(point.context().unwrap().is_response_stream());
}

#[test]
fn response_end_hook_fires_once_after_the_chunks() {
    let seen = trace();
    let ends = seen.clone();
    let pipeline: Pipeline<Text> = Pipeline::new();
    pipeline
        .transport(handler_fn("streamer", |point: &Point<Text>| {
            point.on(Hook::request(|_req, next| {
                let mut writer = next.point().stream_response("head".to_owned())?;
                writer.write("x".to_owned())?.write("y".to_owned())?;
                writer.end()?;
                Ok(())
            }))?;
            Ok(())
        }))
        .add_back(handler_fn("watcher", move |point: &Point<Text>| {
            let ends = ends.clone();
            point.on(Hook::response_end(move |resume| {
                ends.borrow_mut().push("watcher:end".to_owned());
                resume.resume()
            }))?;
            Ok(())
        }));

    let point = pipeline.create(None).unwrap();
    let head = seen.clone();
    point
        .on(Hook::response(move |res, _next| {
            head.borrow_mut().push(res);
            Ok(())
        }))
        .unwrap();
    let chunks = seen.clone();
    point
        .on(Hook::response_data(move |chunk, _next| {
            chunks
                .borrow_mut()
                .push(chunk.unwrap_or_else(|| "eos".to_owned()));
            Ok(())
        }))
        .unwrap();
    point.request("get".to_owned()).unwrap();
    point.flush().unwrap();

    assert_eq!(entries(&seen), ["head", "x", "y", "watcher:end", "eos"]);
}

#[test]
fn stage_can_drop_chunks() {
    let seen = trace();
    let pipeline: Pipeline<Text> = Pipeline::new();
    pipeline
        .transport(chunk_sink(&seen))
        .add_back(handler_fn("filter", |point: &Point<Text>| {
            point.on(Hook::request_data(|chunk, next| match chunk.as_deref() {
                Some("skip") => Ok(()),
                _ => next.resume(chunk),
            }))?;
            Ok(())
        }));

    let mut writer = pipeline.head().stream_request("s".to_owned()).unwrap();
    for chunk in ["a", "skip", "b"] {
        writer.write(chunk.to_owned()).unwrap();
    }
    writer.end().unwrap();

    assert_eq!(entries(&seen), ["head:s", "a", "b", "eos"]);
}
