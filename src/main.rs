use structopt::StructOpt;

use nanolp::cli;

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL : mimallocator::Mimalloc = mimallocator::Mimalloc;

/// Reference driver. The interpreter core is a library; programs and
/// queries reach it through the embedding application's compiler, so
/// this binary only exposes the core's option surface and the built-in
/// documentation. Exit codes : 0 success, 1 failure, 2 usage error.
///
/// The core's own parser (`cli::parse_args`) consumes the documented
/// single-dash flags — `-trace`, `-delay-outside-fragment`,
/// `-max-steps N`, `-document-builtins` — and hands everything else
/// back unmodified; what it hands back lands here. The driver defines
/// no flags of its own, so any leftover argument is a usage error,
/// while --help and --version come with the derive.
#[derive(StructOpt, Debug)]
#[structopt(name = "nanolp", about = "reference driver for the nanolp interpreter core")]
struct Opt {}

fn main() {
    let raw : Vec<String> = std::env::args().skip(1).collect();
    let (options, rest) = match cli::parse_args(&raw) {
        Ok(parsed) => parsed,
        Err(msg) => {
            eprintln!("usage error : {}", msg);
            std::process::exit(2);
        },
    };

    let argv0 = std::iter::once(String::from("nanolp"));
    if let Err(e) = Opt::clap().get_matches_from_safe(argv0.chain(rest.into_iter())) {
        match e.kind {
            structopt::clap::ErrorKind::HelpDisplayed
            | structopt::clap::ErrorKind::VersionDisplayed => e.exit(),
            _ => {
                eprintln!("{}", e.message);
                std::process::exit(2);
            },
        }
    }

    if options.trace {
        env_logger::Builder::new()
            .filter(Some("nanolp"), log::LevelFilter::Trace)
            .init();
    }

    let interp = nanolp::InterpreterBuilder::new().options(options.clone()).build();

    if options.document_builtins {
        print!("{}", interp.document_builtins());
        std::process::exit(0);
    }

    eprintln!("nanolp is an embeddable interpreter core; this driver only \
               documents its builtins (-document-builtins). Embed the \
               library to compile and run programs.");
    std::process::exit(2);
}
