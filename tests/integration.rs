use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, TryStreamExt};
use http::header;
use partstream::{Boundary, Error, Limits, MultipartEvent, MultipartEvents};

/// Feeds the parser one byte at a time so that boundaries, header blocks
/// and suffix probes all straddle chunk borders.
fn byte_stream(data: &str) -> impl Stream<Item = partstream::Result<Bytes>> + Send + Sync + Unpin + 'static {
    let chunks: Vec<partstream::Result<Bytes>> = data
        .as_bytes()
        .chunks(1)
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    stream::iter(chunks)
}

fn whole_stream(data: &str) -> impl Stream<Item = partstream::Result<Bytes>> + Send + Sync + Unpin + 'static {
    stream::iter(vec![Ok(Bytes::copy_from_slice(data.as_bytes()))])
}

#[tokio::test]
async fn test_single_part() {
    let data = "--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n--XYZ--\r\n";
    let mut events = partstream::parse_multipart(
        byte_stream(data),
        "multipart/form-data; boundary=XYZ",
        None,
    )
    .unwrap();

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event first"),
    };

    let headers = part.headers().await.unwrap();
    assert!(headers.contains_key(header::CONTENT_DISPOSITION));
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"hello"));

    // no preamble was emitted and, with the total length unknown, no
    // epilogue follows the closing boundary
    assert!(events.next_event().await.unwrap().is_none());
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_single_part_one_chunk() {
    let data = "--XYZ\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\nhello\r\n--XYZ--\r\n";
    let mut events = partstream::parse_multipart(
        whole_stream(data),
        "multipart/form-data; boundary=XYZ",
        None,
    )
    .unwrap();

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event first"),
    };
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"hello"));
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_quoted_boundary() {
    let content_type = "multipart/mixed; boundary=\"a;b c\"";
    assert_eq!(
        partstream::parse_boundary(content_type).unwrap().value(),
        b"a;b c"
    );

    let data = "--a;b c\r\nContent-Type: text/plain\r\n\r\nqq\r\n--a;b c--\r\n";
    let mut events = partstream::parse_multipart(byte_stream(data), content_type, None).unwrap();

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"qq"));
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_preamble_and_epilogue() {
    let data = "intro\r\n--B\r\n\r\n\r\n--B\r\n\r\n\r\n--B--bye";
    let boundary = partstream::parse_boundary("multipart/mixed; boundary=B").unwrap();
    let mut events = MultipartEvents::new(byte_stream(data), boundary, Some(data.len() as u64));

    match events.next_event().await.unwrap() {
        Some(MultipartEvent::Preamble(bytes)) => assert_eq!(bytes, Bytes::from_static(b"intro\r\n")),
        _ => panic!("expected the preamble first"),
    }

    for _ in 0..2 {
        let mut part = match events.next_event().await.unwrap() {
            Some(MultipartEvent::Part(part)) => part,
            _ => panic!("expected a part event"),
        };
        assert!(part.headers().await.unwrap().is_empty());
        assert_eq!(part.bytes().await.unwrap().len(), 0);
    }

    match events.next_event().await.unwrap() {
        Some(MultipartEvent::Epilogue(bytes)) => assert_eq!(bytes, Bytes::from_static(b"bye")),
        _ => panic!("expected the epilogue last"),
    }

    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_round_trip() {
    let preamble = "prelude text\r\n";
    let body_one = "alpha body";
    let body_two = "beta";
    let epilogue = "farewell";
    let data = format!(
        "{}--RT\r\nContent-Type: text/plain\r\n\r\n{}\r\n--RT\r\nContent-Type: application/octet-stream\r\n\r\n{}\r\n--RT--{}",
        preamble, body_one, body_two, epilogue
    );
    let boundary = Boundary::from_value("RT").unwrap();
    let mut events = MultipartEvents::new(byte_stream(&data), boundary, Some(data.len() as u64));

    match events.next_event().await.unwrap() {
        Some(MultipartEvent::Preamble(bytes)) => assert_eq!(bytes, preamble.as_bytes()),
        _ => panic!("expected the preamble first"),
    }

    for expected in &[body_one, body_two] {
        let mut part = match events.next_event().await.unwrap() {
            Some(MultipartEvent::Part(part)) => part,
            _ => panic!("expected a part event"),
        };
        assert!(part.headers().await.unwrap().contains_key(header::CONTENT_TYPE));
        assert_eq!(part.bytes().await.unwrap(), expected.as_bytes());
    }

    match events.next_event().await.unwrap() {
        Some(MultipartEvent::Epilogue(bytes)) => assert_eq!(bytes, epilogue.as_bytes()),
        _ => panic!("expected the epilogue last"),
    }

    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_missing_boundary() {
    assert_eq!(
        partstream::parse_boundary("multipart/form-data"),
        Err(Error::MissingBoundary)
    );
    assert!(matches!(
        partstream::parse_multipart(byte_stream(""), "multipart/form-data", None),
        Err(Error::MissingBoundary)
    ));
}

#[tokio::test]
async fn test_not_multipart() {
    assert!(matches!(
        partstream::parse_multipart(byte_stream(""), "text/plain", None),
        Err(Error::NotMultipart)
    ));
    // a boundary parameter alone does not make it multipart
    assert!(matches!(
        partstream::parse_multipart(byte_stream(""), "text/plain; boundary=x", None),
        Err(Error::NotMultipart)
    ));
}

#[tokio::test]
async fn test_part_body_over_limit() {
    let body = "x".repeat(100);
    let data = format!("--L\r\nContent-Type: text/plain\r\n\r\n{}\r\n--L--\r\n", body);
    let mut events = MultipartEvents::with_limits(
        byte_stream(&data),
        Boundary::from_value("L").unwrap(),
        None,
        Limits::new().part_size(10),
    );

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };

    // headers still resolve; the failure belongs to the body
    assert!(part.headers().await.unwrap().contains_key(header::CONTENT_TYPE));

    let err = loop {
        match part.chunk().await {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("the body ended without an error"),
            Err(err) => break err,
        }
    };
    assert_eq!(err, Error::LimitExceeded { limit: 10 });

    // the event stream surfaces the same failure, then closes
    assert!(matches!(
        events.next_event().await,
        Err(Error::LimitExceeded { .. })
    ));
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_content_length_exceeds_limit() {
    let body = "y".repeat(100);
    let data = format!("--L\r\nContent-Length: 100\r\n\r\n{}\r\n--L--\r\n", body);
    let mut events = MultipartEvents::with_limits(
        byte_stream(&data),
        Boundary::from_value("L").unwrap(),
        None,
        Limits::new().part_size(10),
    );

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };

    // the declared length is rejected before any body byte is copied
    assert!(part.headers().await.unwrap().contains_key(header::CONTENT_LENGTH));
    assert!(matches!(
        part.chunk().await,
        Err(Error::LimitExceeded { limit: 10 })
    ));
    assert!(matches!(
        events.next_event().await,
        Err(Error::LimitExceeded { .. })
    ));
}

#[tokio::test]
async fn test_preamble_over_limit() {
    let data = format!("{}\r\n--B\r\n\r\nx\r\n--B--\r\n", "p".repeat(100));
    let mut events = MultipartEvents::with_limits(
        byte_stream(&data),
        Boundary::from_value("B").unwrap(),
        None,
        Limits::new().preamble_size(16),
    );

    let err = match events.next_event().await {
        Err(err) => err,
        Ok(_) => panic!("expected the preamble cap to trip"),
    };
    assert_eq!(err, Error::LimitExceeded { limit: 16 });
}

#[tokio::test]
async fn test_preamble_over_limit_without_boundary() {
    // even before any boundary shows up, settled bytes beyond the cap
    // (the token tail that may still complete is held back) trip the
    // limit
    let data = "q".repeat(100);
    let mut events = MultipartEvents::with_limits(
        byte_stream(&data),
        Boundary::from_value("B").unwrap(),
        None,
        Limits::new().preamble_size(16),
    );

    let err = match events.next_event().await {
        Err(err) => err,
        Ok(_) => panic!("expected the preamble cap to trip"),
    };
    assert_eq!(err, Error::LimitExceeded { limit: 16 });
}

#[tokio::test]
async fn test_boundary_line_over_limit() {
    let data = format!("--B{}\r\n\r\nx\r\n--B--\r\n", " ".repeat(100));
    let mut events = MultipartEvents::with_limits(
        byte_stream(&data),
        Boundary::from_value("B").unwrap(),
        None,
        Limits::new().boundary_line(16),
    );

    let err = match events.next_event().await {
        Err(err) => err,
        Ok(_) => panic!("expected the boundary-line cap to trip"),
    };
    assert_eq!(err, Error::BoundaryLineTooLong);
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_boundary_line_junk_without_crlf() {
    // trailing junk that never reaches a CRLF trips the cap as well
    let data = format!("--B {}", "x".repeat(100));
    let mut events = MultipartEvents::with_limits(
        byte_stream(&data),
        Boundary::from_value("B").unwrap(),
        None,
        Limits::new().boundary_line(16),
    );

    let err = match events.next_event().await {
        Err(err) => err,
        Ok(_) => panic!("expected the boundary-line cap to trip"),
    };
    assert_eq!(err, Error::BoundaryLineTooLong);
}

#[tokio::test]
async fn test_release_part() {
    let data = "--R\r\nContent-Type: text/plain\r\n\r\nskipped data\r\n--R\r\nContent-Type: text/plain\r\n\r\nkept\r\n--R--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("R").unwrap(), None);

    let part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };

    let (headers, body) = part.into_parts();
    drop(body);
    assert_eq!(headers.await, Err(Error::Cancelled));

    // the parser drains the released body itself and moves on
    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected the next part"),
    };
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"kept"));
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_release_every_event() {
    let data = "intro\r\n--B\r\nContent-Type: text/plain\r\n\r\nfirst\r\n--B\r\n\r\nsecond\r\n--B--bye";
    let boundary = Boundary::from_value("B").unwrap();
    let mut events = MultipartEvents::new(byte_stream(data), boundary, Some(data.len() as u64));

    let mut seen = Vec::new();
    while let Some(event) = events.next_event().await.unwrap() {
        seen.push(match &event {
            MultipartEvent::Preamble(_) => "preamble",
            MultipartEvent::Part(_) => "part",
            MultipartEvent::Epilogue(_) => "epilogue",
        });
        event.release();
    }
    assert_eq!(seen, ["preamble", "part", "part", "epilogue"]);
}

#[tokio::test]
async fn test_zero_parts() {
    let data = "--Z--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("Z").unwrap(), None);

    assert!(events.next_event().await.unwrap().is_none());
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_epilogue_after_immediate_close() {
    // with the total length known, whatever follows the closing
    // boundary is the epilogue, its CRLF included
    let data = "--Z--\r\n";
    let mut events = MultipartEvents::new(
        byte_stream(data),
        Boundary::from_value("Z").unwrap(),
        Some(data.len() as u64),
    );

    match events.next_event().await.unwrap() {
        Some(MultipartEvent::Epilogue(bytes)) => assert_eq!(bytes, Bytes::from_static(b"\r\n")),
        _ => panic!("expected an epilogue event"),
    }
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_empty_epilogue() {
    // the total length is known and the body ends exactly at the
    // closing boundary, so no epilogue event is emitted
    let data = "--B\r\n\r\nx\r\n--B--";
    let mut events = MultipartEvents::new(
        byte_stream(data),
        Boundary::from_value("B").unwrap(),
        Some(data.len() as u64),
    );

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"x"));

    assert!(events.next_event().await.unwrap().is_none());
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_part_without_headers() {
    let data = "--N\r\n\r\nraw bytes\r\n--N--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("N").unwrap(), None);

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };
    assert!(part.headers().await.unwrap().is_empty());
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"raw bytes"));
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_content_length_part() {
    let data = "--K\r\nContent-Length: 5\r\n\r\nhello\r\n--K--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("K").unwrap(), None);

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"hello"));
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_content_length_zero() {
    let data = "--K\r\nContent-Length: 0\r\n\r\n\r\n--K--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("K").unwrap(), None);

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };
    assert!(part.headers().await.unwrap().contains_key(header::CONTENT_LENGTH));
    assert_eq!(part.bytes().await.unwrap().len(), 0);
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_malformed_headers() {
    let data = "--W\r\nnot a header line\r\n\r\nx\r\n--W--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("W").unwrap(), None);

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };
    assert!(matches!(
        part.headers().await,
        Err(Error::MalformedHeaders { .. })
    ));
    assert!(matches!(
        events.next_event().await,
        Err(Error::MalformedHeaders { .. })
    ));
}

#[tokio::test]
async fn test_truncated_body() {
    let data = "--E\r\nContent-Type: text/plain\r\n\r\ntrunca";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("E").unwrap(), None);

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };
    assert!(part.headers().await.is_ok());

    let err = loop {
        match part.chunk().await {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("the body ended without an error"),
            Err(err) => break err,
        }
    };
    assert_eq!(err, Error::UnexpectedEof);
}

#[tokio::test]
async fn test_single_dash_suffix_is_not_closing() {
    // a lone `-` after the boundary token is boundary-line junk, not
    // half of the closing pair
    let data = "--P\r\n\r\nA\r\n--P-x\r\n\r\nB\r\n--P--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("P").unwrap(), None);

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected the first part"),
    };
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"A"));

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected the second part"),
    };
    assert_eq!(part.bytes().await.unwrap(), Bytes::from_static(b"B"));

    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_headers_resolve_before_body() {
    let data = "--H\r\nContent-Type: text/plain\r\n\r\npayload\r\n--H--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("H").unwrap(), None);

    let part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };

    // drive only the body; the headers complete as a side effect and
    // stay retrievable afterwards
    let (headers, mut body) = part.into_parts();
    let mut collected = BytesMut::new();
    while let Some(chunk) = body.try_next().await.unwrap() {
        collected.extend_from_slice(&chunk);
    }
    assert_eq!(&collected[..], b"payload");

    let headers = headers.await.unwrap();
    assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "text/plain");

    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_multi_value_headers() {
    let data = "--M\r\nX-Tag: one\r\nX-Tag: two\r\n\r\n\r\n--M--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("M").unwrap(), None);

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };
    let headers = part.headers().await.unwrap();
    let tags: Vec<_> = headers.get_all("x-tag").iter().collect();
    assert_eq!(tags, ["one", "two"]);
    assert_eq!(part.bytes().await.unwrap().len(), 0);
    assert!(events.next_event().await.unwrap().is_none());
}

#[tokio::test]
async fn test_cancel_on_stream_drop() {
    let data = "--C\r\nContent-Type: text/plain\r\n\r\nbody\r\n--C--\r\n";
    let mut events = MultipartEvents::new(byte_stream(data), Boundary::from_value("C").unwrap(), None);

    let mut part = match events.next_event().await.unwrap() {
        Some(MultipartEvent::Part(part)) => part,
        _ => panic!("expected a part event"),
    };

    drop(events);

    assert_eq!(part.headers().await, Err(Error::Cancelled));
    assert!(matches!(part.chunk().await, Err(Error::Cancelled)));
}
