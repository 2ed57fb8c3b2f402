fn main() {
    // libgit2 needs the Windows crypto and registry APIs when linked statically
    if std::env::var("CARGO_CFG_TARGET_OS").is_ok_and(|os| os == "windows") {
        println!("cargo:rustc-link-lib=advapi32");
    }
}
