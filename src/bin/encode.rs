use clap::{arg,crate_version,Command};
use varlzw::lzw;

const USAGE: &str = "Usage: encode [-m MAXBITS | -o NAME | -i NAME | -p USED]*";
const USAGE_ERR: i32 = 1;
const FILE_ERR: i32 = 2;

fn main() {
    env_logger::init();
    let cmd = Command::new("encode")
        .about("Compress stdin to stdout with variable width LZW")
        .version(crate_version!())
        .args_override_self(true)
        .arg(arg!(-m <MAXBITS> "code width ceiling in bits, clamped to [9,20]")
            .value_parser(clap::value_parser!(usize)).required(false))
        .arg(arg!(-o <DUMP> "write the final dictionary to this sidecar file")
            .required(false))
        .arg(arg!(-i <PRELOAD> "preload the dictionary from this sidecar file")
            .required(false))
        .arg(arg!(-p <USED> "prune threshold, entries used fewer times are dropped")
            .value_parser(clap::value_parser!(usize)).required(false));

    let matches = match cmd.try_get_matches() {
        Ok(matches) => matches,
        Err(e) => match e.kind() {
            clap::error::ErrorKind::DisplayHelp | clap::error::ErrorKind::DisplayVersion => e.exit(),
            _ => {
                eprintln!("{}",USAGE);
                std::process::exit(USAGE_ERR);
            }
        }
    };

    let opt = lzw::Options {
        max_bits: matches.get_one::<usize>("MAXBITS").copied().unwrap_or(lzw::STD_OPTIONS.max_bits),
        used: matches.get_one::<usize>("USED").copied().unwrap_or(0),
        preload: matches.get_one::<String>("PRELOAD").cloned()
    };

    // open the dump file up front so a bad path fails before any data moves
    let dump = match matches.get_one::<String>("DUMP") {
        Some(name) => match std::fs::File::create(name) {
            Ok(file) => Some(file),
            Err(_) => {
                eprintln!("encode: unable to open or create file {}",name);
                std::process::exit(FILE_ERR);
            }
        },
        None => None
    };

    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    match lzw::compress(&mut stdin,&mut stdout,&opt) {
        Ok(table) => {
            if let Some(file) = dump {
                let mut writer = std::io::BufWriter::new(file);
                if let Err(e) = table.dump(&mut writer) {
                    eprintln!("encode: {}",e);
                    std::process::exit(FILE_ERR);
                }
            }
        },
        Err(e) => {
            eprintln!("encode: {}",e);
            match e.downcast_ref::<varlzw::Error>() {
                Some(varlzw::Error::FileUnavailable(_)) => std::process::exit(FILE_ERR),
                _ => std::process::exit(USAGE_ERR)
            }
        }
    }
}
