//! Purpose: Hold top-level CLI command dispatch for `objadm`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Each admin command performs its operation through `api::AdminClient`.
//! Invariants: Output envelopes are built here; helpers in `main.rs` render them.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    context: &CommandContext,
) -> Result<RunOutcome, Failure> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "objadm", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Config {
            command: ConfigCommand::Host { command },
        } => dispatch_host(command, context),
        Command::Admin { command } => match command {
            AdminCommand::User { command } => dispatch_user(command, context),
            AdminCommand::Group { command } => dispatch_group(command, context),
            AdminCommand::Policy { command } => dispatch_policy(command, context),
        },
    }
}

fn dispatch_host(command: HostCommand, context: &CommandContext) -> Result<RunOutcome, Failure> {
    let registry = &context.registry;
    let value = match command {
        HostCommand::Add {
            alias,
            url,
            access_key,
            secret_key,
        } => {
            registry.add(&alias, &url, &access_key, &secret_key)?;
            let entry = registry.get(&alias)?;
            json!({ "host": host_json(&entry) })
        }
        HostCommand::Remove { alias } => {
            registry.remove(&alias)?;
            json!({ "removed": { "alias": alias } })
        }
        HostCommand::List => {
            let hosts = registry
                .list()?
                .values()
                .map(host_json)
                .collect::<Vec<_>>();
            json!({ "hosts": hosts })
        }
    };
    emit_json(value, context.color_mode);
    Ok(RunOutcome::ok())
}

fn dispatch_user(command: UserCommand, context: &CommandContext) -> Result<RunOutcome, Failure> {
    let value = match command {
        UserCommand::Add { target, secret_key } => {
            context
                .connect(&target.host)?
                .user()
                .add(&target.access_key, &secret_key)?;
            json!({ "user": { "accessKey": target.access_key } })
        }
        UserCommand::Enable { target } => {
            context.connect(&target.host)?.user().enable(&target.access_key)?;
            json!({ "user": user_status_json(&target.access_key, UserStatus::Enabled) })
        }
        UserCommand::Disable { target } => {
            context.connect(&target.host)?.user().disable(&target.access_key)?;
            json!({ "user": user_status_json(&target.access_key, UserStatus::Disabled) })
        }
        UserCommand::Info { target } => {
            let info = context.connect(&target.host)?.user().details(&target.access_key)?;
            json!({ "user": info })
        }
        UserCommand::List { host } => {
            let users = context
                .connect(&host)?
                .user()
                .list()?
                .into_iter()
                .map(|(access_key, status)| user_status_json(&access_key, status))
                .collect::<Vec<_>>();
            json!({ "users": users })
        }
        UserCommand::Remove { target } => {
            context.connect(&target.host)?.user().remove(&target.access_key)?;
            json!({ "removed": { "accessKey": target.access_key } })
        }
    };
    emit_json(value, context.color_mode);
    Ok(RunOutcome::ok())
}

fn dispatch_group(command: GroupCommand, context: &CommandContext) -> Result<RunOutcome, Failure> {
    let value = match command {
        GroupCommand::Add { target, members } => {
            let Some((first, rest)) = members.split_first() else {
                return Err(Failure::usage("group add needs at least one member")
                    .with_hint("Use `objadm admin group add <host> <group> <member>...`."));
            };
            context
                .connect(&target.host)?
                .group()
                .add(&target.group, first, rest)?;
            json!({ "group": { "name": target.group, "added": members } })
        }
        GroupCommand::Enable { target } => {
            context.connect(&target.host)?.group().enable(&target.group)?;
            json!({ "group": group_status_json(&target.group, GroupStatus::Enabled) })
        }
        GroupCommand::Disable { target } => {
            context.connect(&target.host)?.group().disable(&target.group)?;
            json!({ "group": group_status_json(&target.group, GroupStatus::Disabled) })
        }
        GroupCommand::Info { target } => {
            let info = context.connect(&target.host)?.group().info(&target.group)?;
            json!({ "group": info })
        }
        GroupCommand::List { host } => {
            let groups = context.connect(&host)?.group().list()?;
            json!({ "groups": groups })
        }
        GroupCommand::Remove { target, members } => {
            let client = context.connect(&target.host)?.group();
            if members.is_empty() {
                client.delete(&target.group)?;
                json!({ "removed": { "name": target.group } })
            } else {
                client.remove(&target.group, members.as_slice())?;
                json!({ "group": { "name": target.group, "removed": members } })
            }
        }
    };
    emit_json(value, context.color_mode);
    Ok(RunOutcome::ok())
}

fn dispatch_policy(command: PolicyCommand, context: &CommandContext) -> Result<RunOutcome, Failure> {
    let value = match command {
        PolicyCommand::Add { target, file } => {
            let document = read_policy_document(&file)?;
            context
                .connect(&target.host)?
                .policy()
                .add(&target.policy, &document)?;
            json!({ "policy": { "name": target.policy } })
        }
        PolicyCommand::Info { target } => {
            let info = context.connect(&target.host)?.policy().info(&target.policy)?;
            json!({ "policy": info })
        }
        PolicyCommand::List { host } => {
            let policies = context.connect(&host)?.policy().list()?;
            json!({ "policies": policies })
        }
        PolicyCommand::Remove { target } => {
            context.connect(&target.host)?.policy().remove(&target.policy)?;
            json!({ "removed": { "name": target.policy } })
        }
        PolicyCommand::Attach {
            target,
            user,
            group,
        } => {
            let principal = principal_from_flags(user, group)?;
            context
                .connect(&target.host)?
                .policy()
                .attach(&target.policy, &principal)?;
            let mut attached = Map::new();
            attached.insert("policy".to_string(), json!(target.policy));
            match principal {
                Principal::User(name) => attached.insert("user".to_string(), json!(name)),
                Principal::Group(name) => attached.insert("group".to_string(), json!(name)),
            };
            json!({ "attached": attached })
        }
    };
    emit_json(value, context.color_mode);
    Ok(RunOutcome::ok())
}
