use formdata::codec::next_item;
use formdata::prelude::*;
use futures_executor::block_on;

#[test]
fn prelude_covers_a_full_exchange() {
    let mut form = FormData::new();
    form.append("survey[answers][0]", "yes");
    form.append("survey[answers][1]", "no");
    form.append("survey[score]", 4.5);
    form.append("survey[done]", true);
    form.append_file("survey[photo]", b"JPEGDATA".to_vec(), "photo.jpg");

    let mut writer = RequestWriter::new();
    let content_type = form.content_type();
    let RequestWrite::Sized { head, body, length } =
        writer.write("POST", "/survey", "example.org", form)
    else {
        panic!("form without streams has a known length");
    };
    assert!(String::from_utf8_lossy(&head).contains(&format!("content-length: {length}")));

    let bytes = block_on(body.into_bytes()).unwrap();
    assert_eq!(bytes.len() as u64, length);

    let mut tree = block_on(read_form(
        &content_type,
        ChunkedBytes::new(bytes, 32),
        MultipartConfig::default(),
    ))
    .unwrap();

    assert_eq!(
        tree.lookup("survey[score]").and_then(ParsedNode::as_text),
        Some("4.5")
    );
    assert_eq!(
        tree.lookup("survey[done]").and_then(ParsedNode::as_text),
        Some("true")
    );
    let answers = tree
        .lookup("survey[answers]")
        .and_then(ParsedNode::as_sequence)
        .unwrap();
    assert_eq!(answers.len(), 2);

    let photo = tree
        .lookup_mut("survey[photo]")
        .and_then(ParsedNode::as_file_mut)
        .unwrap();
    assert_eq!(photo.content_type(), "image/jpeg");
    assert_eq!(block_on(photo.read()).unwrap(), b"JPEGDATA");
}

#[test]
fn parts_can_be_streamed_one_by_one() {
    let mut form = FormData::new();
    form.append("first", "1");
    form.append_file("second", b"0123456789".to_vec(), "digits.txt");
    let boundary = form.boundary().clone();
    let body = block_on(form.into_stream().into_bytes()).unwrap();

    let mut multipart = Multipart::new(ChunkedBytes::new(body, 4), boundary);
    block_on(async {
        let first = multipart.next_part().await.unwrap().unwrap();
        assert_eq!(first.name(), "first");
        first.skip();

        let mut second = multipart.next_part().await.unwrap().unwrap();
        let mut collected = Vec::new();
        while let Some(chunk) = next_item(second.body_mut()).await {
            collected.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(collected, b"0123456789");
        assert!(multipart.next_part().await.unwrap().is_none());
    });
}
