use std::path::PathBuf;
use std::time::Duration;

use argh::FromArgs;

use serial_link::{receive_file, send_file, Connection, Role, SerialTransport};

#[derive(FromArgs)]
/// Transfer a file over a serial link using a stop-and-wait protocol.
struct Args {
    /// serial port device, e.g. /dev/ttyUSB0
    #[argh(option)]
    port: String,

    /// baud rate
    #[argh(option, default = "9600")]
    baud: u32,

    /// retransmission timeout in milliseconds
    #[argh(option, default = "3000")]
    timeout_ms: u64,

    /// maximum retransmissions before giving up on the peer
    #[argh(option, default = "3")]
    retries: u32,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Send(SendArgs),
    Receive(ReceiveArgs),
}

/// send a file
#[derive(FromArgs)]
#[argh(subcommand, name = "send")]
struct SendArgs {
    /// path to the file to send
    #[argh(positional)]
    file: PathBuf,
}

/// receive a file
#[derive(FromArgs)]
#[argh(subcommand, name = "receive")]
struct ReceiveArgs {
    /// directory to write the received file into
    #[argh(positional)]
    output_dir: PathBuf,
}

fn main() {
    env_logger::init();
    let args: Args = argh::from_env();

    let role = match args.command {
        Command::Send(_) => Role::Tx,
        Command::Receive(_) => Role::Rx,
    };

    let transport = match SerialTransport::open(&args.port, args.baud) {
        Ok(transport) => transport,
        Err(err) => {
            eprintln!("error: failed to open {}: {err}", args.port);
            std::process::exit(1);
        }
    };

    let timeout = Duration::from_millis(args.timeout_ms);
    let mut connection = match Connection::open(role, transport, timeout, args.retries) {
        Ok(connection) => connection,
        Err(err) => {
            eprintln!("error: handshake failed: {err}");
            std::process::exit(1);
        }
    };

    let result = match &args.command {
        Command::Send(send_args) => send_file(&mut connection, &send_args.file).map(|_| None),
        Command::Receive(receive_args) => receive_file(&mut connection, &receive_args.output_dir).map(Some),
    };

    if let Err(err) = connection.close() {
        eprintln!("warning: clean close failed: {err}");
    }

    match result {
        Ok(path) => {
            let stats = connection.stats();
            println!(
                "frames sent: {}, frames received: {}, retransmissions: {}, rejects sent: {}, rejects received: {}",
                stats.frames_sent,
                stats.frames_received,
                stats.retransmissions,
                stats.rejects_sent,
                stats.rejects_received,
            );
            if let Some(path) = path {
                println!("wrote {}", path.display());
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}
