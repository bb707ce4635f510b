//! Computes the root hash and submission of a file given on the command line.

use zgs_primitives::{FileHandle, error::Result};

fn main() -> Result<()> {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: root_hash <path>");
        std::process::exit(2);
    };

    let file = FileHandle::open_path(&path)?;
    println!("size:     {} bytes", file.size());
    println!("chunks:   {}", file.num_chunks());
    println!("segments: {}", file.num_segments());
    println!("root:     {}", file.root_hash()?);

    let submission = file.submission(Vec::new())?;
    for node in &submission.nodes {
        println!("node:     height {:>2} root {}", node.height, node.root);
    }
    println!("sectors:  {}", submission.sectors());

    file.close();
    Ok(())
}
