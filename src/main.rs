mod aggregator;
mod args;
mod clump;
mod collate;
mod emitter;
mod errors;
mod fields;
mod parser;
mod utils;

fn main() {
    if let Err(e) = args::get_config().and_then(collate::run) {
        eprintln!("recs-collate: {e}");
        if e.is_config_error() {
            eprintln!();
            eprintln!("{}", args::command().render_help());
        }
        std::process::exit(1);
    }
}
