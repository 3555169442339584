use {
    anonka_common::{Role, UserId},
    anonka_store::UserStore,
};

pub async fn list_users(store: &dyn UserStore, role: Option<Role>) -> anyhow::Result<()> {
    let users = store.list_users(role).await?;
    if users.is_empty() {
        println!("No users found.");
        return Ok(());
    }
    println!("{:>14}  {:<8}  {:>8}  NAME", "ID", "ROLE", "MESSAGES");
    for user in &users {
        println!(
            "{:>14}  {:<8}  {:>8}  {}",
            user.id.get(),
            user.role.as_str(),
            user.message_count,
            user.name.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}

pub async fn promote(store: &dyn UserStore, id: UserId, role: Role) -> anyhow::Result<()> {
    store.set_role(id, role).await?;
    println!("User {id} now has role {role}.");
    Ok(())
}

pub async fn print_stats(store: &dyn UserStore) -> anyhow::Result<()> {
    let stats = store.stats().await?;
    println!("Users:    {}", stats.total_users);
    println!("Messages: {}", stats.total_messages);
    Ok(())
}
