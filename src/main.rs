fn main() -> emsgen::Result<()> {
    emsgen::cli::run()
}
