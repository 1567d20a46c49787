// build.rs

fn main() {
    // Generate build info (VERGEN_GIT_SHA, VERGEN_BUILD_TIMESTAMP, ...)
    vergen::EmitBuilder::builder()
        .all_build()
        .all_git()
        .emit()
        .expect("Unable to generate build info");
}
