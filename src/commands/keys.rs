use git_age::error::Result;
use git_age::identities::GenerateIdentity;

use super::Context;

/// Generate a new identity and print its public key
pub async fn generate_key(ctx: &Context, comment: &str, remote: &str) -> Result<()> {
    let chain = ctx.identity_chain().await?;
    let public_key = chain
        .generate(
            &ctx.cancel,
            &GenerateIdentity {
                comment: comment.to_string(),
                remote: remote.to_string(),
            },
        )
        .await?;

    println!("{public_key}");
    Ok(())
}

/// Print the public keys of all resolvable identities
pub async fn list_keys(ctx: &Context) -> Result<()> {
    let identities = ctx.identities(vec![String::new()]).await?;

    println!("Public Key");
    for identity in identities {
        println!("{}", identity.to_public());
    }
    Ok(())
}
