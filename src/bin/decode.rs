use clap::{arg,crate_version,Command};
use varlzw::lzw;

const USAGE: &str = "Usage: decode [-o NAME]*";
const USAGE_ERR: i32 = 1;
const FILE_ERR: i32 = 2;

fn main() {
    env_logger::init();
    let cmd = Command::new("decode")
        .about("Expand variable width LZW from stdin to stdout")
        .version(crate_version!())
        .args_override_self(true)
        .arg(arg!(-o <DUMP> "write the final dictionary to this sidecar file")
            .required(false));

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

    // open the dump file up front so a bad path fails before any data moves
    let dump = match matches.get_one::<String>("DUMP") {
        Some(name) => match std::fs::File::create(name) {
            Ok(file) => Some(file),
            Err(_) => {
                eprintln!("decode: unable to open or create file {}",name);
                std::process::exit(FILE_ERR);
            }
        },
        None => None
    };

    let mut stdin = std::io::stdin().lock();
    let mut stdout = std::io::stdout().lock();
    match lzw::expand(&mut stdin,&mut stdout) {
        Ok(table) => {
            if let Some(file) = dump {
                let mut writer = std::io::BufWriter::new(file);
                if let Err(e) = table.dump(&mut writer) {
                    eprintln!("decode: {}",e);
                    std::process::exit(FILE_ERR);
                }
            }
        },
        Err(e) => {
            eprintln!("decode: {}",e);
            match e.downcast_ref::<varlzw::Error>() {
                Some(varlzw::Error::FileUnavailable(_)) => std::process::exit(FILE_ERR),
                _ => std::process::exit(USAGE_ERR)
            }
        }
    }
}
