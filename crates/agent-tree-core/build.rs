/// Builds the gRPC client and server code for `proto/agent_tree.proto` using
/// `tonic-prost-build`.
///
/// Besides the message and service bindings, the encoded file descriptor set
/// is written to `OUT_DIR/agent_tree_descriptor.bin` so the server can expose
/// it through gRPC reflection.
///
/// `protoc` is taken from `protoc-bin-vendored` unless `PROTOC` is already set,
/// so the build does not depend on a system-wide protobuf installation.
///
/// Generated code is accessible via:
///
/// ```rust,ignore
/// pub mod proto {
///     tonic::include_proto!("agent_tree");
/// }
/// ```
use std::env;
use std::path::PathBuf;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    if env::var_os("PROTOC").is_none() {
        let protoc = protoc_bin_vendored::protoc_bin_path()
            .map_err(|e| format!("no vendored protoc for this platform: {e:?}"))?;
        // SAFETY: build scripts are single threaded.
        unsafe { env::set_var("PROTOC", protoc) };
    }

    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("agent_tree_descriptor.bin");

    tonic_prost_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(&descriptor_path)
        .compile_protos(&["proto/agent_tree.proto"], &["proto"])?;

    println!("cargo:rerun-if-changed=proto/agent_tree.proto");
    Ok(())
}
