#![deny(warnings)]

use {
    annopy_server::{categories, collections, users, CreateError},
    anyhow::Result,
    std::process,
    structopt::StructOpt,
};

#[derive(StructOpt, Debug)]
#[structopt(
    name = "annopy-admin",
    about = "Collaborative image annotation webapp admin tool"
)]
enum Command {
    /// Register a new user
    AddUser {
        /// SQLite database to create or reuse
        state_file: String,

        /// Forename of new user
        forename: String,

        /// Surname of new user
        surname: String,

        /// Login of new user
        login: String,

        /// Email address of new user
        email: String,

        /// Password of new user
        password: String,
    },

    /// Add a new category for collections to be filed under
    AddCategory {
        /// SQLite database to create or reuse
        state_file: String,

        /// Name of new category
        name: String,
    },

    /// Change an existing user's password
    ChangePassword {
        /// SQLite database to create or reuse
        state_file: String,

        /// Login of the user
        login: String,

        /// The user's current password
        current_password: String,

        /// The new password
        new_password: String,
    },

    /// Delete a collection along with its images and their annotations
    DeleteCollection {
        /// SQLite database to create or reuse
        state_file: String,

        /// Identifier of the collection to delete
        collection_id: i64,
    },
}

fn exit_with(error: CreateError) -> ! {
    for message in error.messages() {
        eprintln!("error: {}", message);
    }

    process::exit(1)
}

#[tokio::main]
async fn main() -> Result<()> {
    pretty_env_logger::init_timed();

    match Command::from_args() {
        Command::AddUser {
            state_file,
            forename,
            surname,
            login,
            email,
            password,
        } => {
            let mut conn = annopy_server::open(&state_file).await?;

            match users::create(&mut conn, &forename, &surname, &login, &email, &password).await {
                Ok(user) => println!("added user {} (id {})", user.login, user.user_id),
                Err(e) => exit_with(e),
            }
        }

        Command::AddCategory { state_file, name } => {
            let mut conn = annopy_server::open(&state_file).await?;

            match categories::create(&mut conn, &name).await {
                Ok(category) => {
                    println!("added category {} (id {})", category.name, category.category_id)
                }
                Err(e) => exit_with(e),
            }
        }

        Command::ChangePassword {
            state_file,
            login,
            current_password,
            new_password,
        } => {
            let mut conn = annopy_server::open(&state_file).await?;

            match users::update_password(
                &mut conn,
                &login,
                &current_password,
                &new_password,
                &new_password,
            )
            .await
            {
                Ok(user) => println!("changed password for {}", user.login),
                Err(e) => exit_with(e),
            }
        }

        Command::DeleteCollection {
            state_file,
            collection_id,
        } => {
            let mut conn = annopy_server::open(&state_file).await?;

            match collections::delete(&mut conn, collection_id).await? {
                Some(collection) => println!(
                    "deleted collection {} (id {})",
                    collection.name, collection.collection_id
                ),
                None => {
                    eprintln!("error: no collection has id {}", collection_id);

                    process::exit(1)
                }
            }
        }
    }

    Ok(())
}
