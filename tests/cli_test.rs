use assert_cmd::Command;
use predicates::prelude::*;
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// push data through `encode args | decode` and check the replay
fn round_trip(data: &[u8],encode_args: &[&str]) -> STDRESULT {
    let mut enc = Command::cargo_bin("encode")?;
    enc.args(encode_args);
    let compressed = enc.write_stdin(data.to_vec())
        .assert()
        .success()
        .get_output().stdout.clone();
    let mut dec = Command::cargo_bin("decode")?;
    dec.write_stdin(compressed)
        .assert()
        .success()
        .stdout(data.to_vec());
    Ok(())
}

#[test]
fn pipeline_round_trip() -> STDRESULT {
    let prose = "What a piece of work is a man! how noble in reason!\n".repeat(40);
    round_trip(prose.as_bytes(),&[])?;
    round_trip(b"",&[])?;
    round_trip(b"A",&[])?;
    round_trip(b"ababababab",&[])
}

#[test]
fn pipeline_round_trip_with_options() -> STDRESULT {
    let prose = "How weary, stale, flat and unprofitable seem to me all the uses of this world!\n".repeat(60);
    round_trip(prose.as_bytes(),&["-m","10"])?;
    round_trip(prose.as_bytes(),&["-m","10","-p","2"])?;
    round_trip(prose.as_bytes(),&["-m","9","-p","1"])
}

#[test]
fn width_ceiling_is_clamped() -> STDRESULT {
    let mut enc = Command::cargo_bin("encode")?;
    let compressed = enc.arg("-m").arg("99").write_stdin("hello".as_bytes().to_vec())
        .assert()
        .success()
        .get_output().stdout.clone();
    assert!(compressed.starts_with(b"20:"));
    let mut dec = Command::cargo_bin("decode")?;
    dec.write_stdin(compressed).assert().success().stdout("hello");
    Ok(())
}

#[test]
fn empty_input_yields_header_only() -> STDRESULT {
    let mut enc = Command::cargo_bin("encode")?;
    enc.write_stdin(Vec::new())
        .assert()
        .success()
        .stdout("12:0:0:");
    Ok(())
}

#[test]
fn sidecar_dump_and_preload() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let dump_path = temp_dir.path().join("warmup.tab");
    let warmup = "the rain in spain falls mainly on the plain\n".repeat(10);

    let mut enc = Command::cargo_bin("encode")?;
    enc.arg("-o").arg(&dump_path).write_stdin(warmup.as_bytes().to_vec())
        .assert()
        .success();
    assert!(std::fs::metadata(&dump_path)?.len() > 0);

    // preload the dump, the stream header names it so decode finds it on its own
    let follow_up = "the rain in maine falls plainly on the grain\n".repeat(5);
    let mut enc = Command::cargo_bin("encode")?;
    let compressed = enc.arg("-i").arg(&dump_path).write_stdin(follow_up.as_bytes().to_vec())
        .assert()
        .success()
        .get_output().stdout.clone();
    let mut dec = Command::cargo_bin("decode")?;
    dec.write_stdin(compressed)
        .assert()
        .success()
        .stdout(follow_up);
    Ok(())
}

#[test]
fn encode_and_decode_dumps_agree() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let enc_dump = temp_dir.path().join("enc.tab");
    let dec_dump = temp_dir.path().join("dec.tab");
    let data = "Though this be madness, yet there is method in it.\n".repeat(20);

    let mut enc = Command::cargo_bin("encode")?;
    let compressed = enc.arg("-o").arg(&enc_dump).write_stdin(data.as_bytes().to_vec())
        .assert()
        .success()
        .get_output().stdout.clone();
    let mut dec = Command::cargo_bin("decode")?;
    dec.arg("-o").arg(&dec_dump).write_stdin(compressed)
        .assert()
        .success()
        .stdout(data);
    match (std::fs::read(enc_dump),std::fs::read(dec_dump)) {
        (Ok(v1),Ok(v2)) => {
            assert!(v1.len() > 0);
            assert_eq!(v1,v2);
        },
        _ => panic!("unable to compare the dictionary dumps")
    }
    Ok(())
}

#[test]
fn usage_errors_exit_1() -> STDRESULT {
    let mut enc = Command::cargo_bin("encode")?;
    enc.arg("-z").assert().failure().code(1);
    let mut enc = Command::cargo_bin("encode")?;
    enc.arg("-m").assert().failure().code(1);
    let mut enc = Command::cargo_bin("encode")?;
    enc.arg("-m").arg("twelve").assert().failure().code(1);
    let mut dec = Command::cargo_bin("decode")?;
    dec.arg("-m").arg("12").assert().failure().code(1);
    Ok(())
}

#[test]
fn file_errors_exit_2() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let bad_path = temp_dir.path().join("no_such_dir").join("dump.tab");
    let mut enc = Command::cargo_bin("encode")?;
    enc.arg("-o").arg(&bad_path).write_stdin(Vec::new()).assert().failure().code(2);
    let mut dec = Command::cargo_bin("decode")?;
    dec.arg("-o").arg(&bad_path).write_stdin(Vec::new()).assert().failure().code(2);
    let missing = temp_dir.path().join("missing.tab");
    let mut enc = Command::cargo_bin("encode")?;
    enc.arg("-i").arg(&missing).write_stdin(Vec::new()).assert().failure().code(2);
    Ok(())
}

#[test]
fn corrupt_streams_are_rejected() -> STDRESULT {
    let mut dec = Command::cargo_bin("decode")?;
    dec.write_stdin("this is not a code stream".as_bytes().to_vec())
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid header"));
    // well formed header, then a code with no dictionary entry behind it
    let mut bad = b"9:0:0:".to_vec();
    bad.extend(hex::decode("2c01").unwrap());
    let mut dec = Command::cargo_bin("decode")?;
    dec.write_stdin(bad)
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid code"));
    Ok(())
}
