use std::path::Path;

use mist_core::Requests;
use mist_core::scenario::read_document;
use mist_kube::{ContainerSpecs, request_manifests};

use super::optimize::write_list;

pub fn materialize(requests: &Path, request_specs: &Path, output: &Path) -> anyhow::Result<()> {
    let requests: Requests = read_document(requests)?;
    let specs: ContainerSpecs = read_document(request_specs)?;

    let items = request_manifests(&requests, &specs)?;
    let count = items.len();
    write_list(output, items)?;
    println!("✓ Wrote {count} manifests for {} requests to {}", requests.len(), output.display());
    Ok(())
}
