//! One-shot client for the agent tree service.
//!
//! Prints the child ids of `--agent-id`, one per line, in the order the server
//! returned them.

use agent_tree_core::{
    proto::{GetAgentIdsByParentAgentIdRequest, agent_tree_client::AgentTreeClient},
    types::{AgentId, ChildAgentIdsRequest},
};
use anyhow::Context;
use clap::Parser;
use tonic::{codec::CompressionEncoding, transport::Channel};

#[derive(Parser, Debug)]
#[command(
    name = "agent-tree-client",
    version,
    about = "Query the agent tree service for the children of an agent"
)]
struct ClientArgs {
    /// Address of the agent tree server.
    ///
    /// Environment variable: `AGENT_TREE_ADDR`
    #[arg(long, env = "AGENT_TREE_ADDR", default_value_t = String::from("http://127.0.0.1:50000"))]
    addr: String,

    /// Parent agent id; 0 lists the root agents.
    #[arg(long, allow_negative_numbers = true, default_value_t = 0)]
    agent_id: AgentId,

    /// Compress requests with zstd.
    #[arg(long, default_value_t = false)]
    zstd: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ClientArgs::parse();

    let channel = Channel::from_shared(args.addr.clone())
        .with_context(|| format!("invalid address {}", args.addr))?
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", args.addr))?;

    let mut client = AgentTreeClient::new(channel).accept_compressed(CompressionEncoding::Zstd);
    if args.zstd {
        client = client.send_compressed(CompressionEncoding::Zstd);
    }

    let resp = client
        .get_agent_ids_by_parent_agent_id(GetAgentIdsByParentAgentIdRequest::from(
            ChildAgentIdsRequest::new(args.agent_id),
        ))
        .await
        .context("lookup failed")?
        .into_inner();

    for id in resp.agent_ids {
        println!("{id}");
    }
    Ok(())
}
