//! End-to-end rendering of loaded templates against a finished session

use catflap_gate::io::{create_publish_channel, OutputWriter};
use catflap_gate::services::template::TranslatorContext;
use catflap_gate::services::{AdmissionSettings, OutputDispatcher};
use chrono::{Local, TimeZone};
use std::io::Write;
use std::sync::Arc;
use tempfile::{NamedTempFile, TempDir};

fn context(out: &TempDir) -> TranslatorContext {
    let settings = AdmissionSettings {
        output_path: out.path().display().to_string(),
        template_output_path: "%output_path%".to_string(),
        ..Default::default()
    };
    let now = Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap();
    TranslatorContext::sample(Arc::new(settings), now)
}

#[test]
fn test_loaded_template_writes_and_publishes() {
    let out = TempDir::new().unwrap();
    let ctx = context(&out);

    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        "%!event keep_open\n%!filename session_%match_group_id:6%.txt\n%!topic sessions\n\
         %match_group_success_count%/%match_group_count% %match_group_direction% %state%"
    )
    .unwrap();
    file.flush().unwrap();

    let (publisher, mut rx) = create_publish_channel(8, "catflap".to_string());
    let mut output = OutputDispatcher::new(OutputWriter::new()).with_publisher(publisher);
    let spec = format!("[session]{}", file.path().display());
    output.load(&spec).unwrap();

    assert!(output.generate("locked_out", &ctx).is_empty());

    let rendered = output.generate("keep_open", &ctx);
    assert_eq!(rendered.len(), 1);
    let r = &rendered[0];
    assert_eq!(r.template, "session");
    assert!(r.written);
    assert!(r.published);

    let id = ctx.group.id.to_hex();
    let expected = out.path().join(format!("session_{}.txt", &id[..6]));
    assert_eq!(r.path, expected);
    assert_eq!(std::fs::read_to_string(&expected).unwrap(), "3/4 in Keep open");

    let msg = rx.try_recv().unwrap();
    assert_eq!(msg.topic, "catflap/sessions");
    assert_eq!(&msg.payload[..], b"3/4 in Keep open");
}

#[test]
fn test_broken_template_does_not_block_others() {
    let out = TempDir::new().unwrap();
    let ctx = context(&out);

    let mut output = OutputDispatcher::new(OutputWriter::new());
    output.add_template("%match9_success%", "[broken]broken.txt").unwrap();
    output.add_template("%!nozmq\nrfid %rfid_inner_tag%", "[rfid]rfid.txt").unwrap();

    let rendered = output.generate("keep_open", &ctx);
    assert_eq!(rendered.len(), 1);
    assert_eq!(rendered[0].template, "rfid");
    assert_eq!(std::fs::read_to_string(out.path().join("rfid.txt")).unwrap(), "rfid 999_000000001007");
    assert!(!out.path().join("broken.txt").exists());
}
