/*
 *     Copyright (C) 2023  Fritz Ochsmann
 *
 *     This program is free software: you can redistribute it and/or modify
 *     it under the terms of the GNU Affero General Public License as published
 *     by the Free Software Foundation, either version 3 of the License, or
 *     (at your option) any later version.
 *
 *     This program is distributed in the hope that it will be useful,
 *     but WITHOUT ANY WARRANTY; without even the implied warranty of
 *     MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *     GNU Affero General Public License for more details.
 *
 *     You should have received a copy of the GNU Affero General Public License
 *     along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use crate::database::id::serialize_thing;
use crate::prelude::*;
use chrono::{DateTime, Utc};
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use strum::{AsRefStr, Display, EnumString};
use surrealdb::sql::Thing;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    Default,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Editor,
    #[default]
    Viewer,
}

impl Role {
    /// Elevated accounts may mutate every task and receive completion and overdue alerts.
    pub fn is_elevated(&self) -> bool {
        matches!(self, Role::Admin)
    }

    pub fn manages_groups(&self) -> bool {
        matches!(self, Role::Admin | Role::Editor)
    }
}

fn default_locale() -> String {
    "es".to_owned()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Getters)]
#[get = "pub"]
pub struct Account {
    #[serde(serialize_with = "serialize_thing")]
    id: Thing,
    name: String,
    mail: String,
    #[serde(default)]
    role: Role,
    #[serde(default = "default_locale")]
    locale: String,
    created_at: DateTime<Utc>,
}

impl Account {
    #[instrument(skip(info))]
    pub async fn fetch(id: &Thing, info: &ConnectionInfo) -> Result<Option<Account>> {
        info.bounded(async {
            let account: Option<Account> = sql_span!(
                info.connection
                    .query("SELECT * FROM $account")
                    .bind(("account", id))
                    .await?
                    .take(0)?,
                "fetching account"
            );

            Ok(account)
        })
        .await
    }

    /// All elevated accounts in creation order.
    #[instrument(skip(info))]
    pub async fn elevated(info: &ConnectionInfo) -> Result<Vec<Account>> {
        info.bounded(async {
            let accounts: Vec<Account> = sql_span!(
                info.connection
                    .query("SELECT * FROM account WHERE role = $role ORDER BY created_at ASC")
                    .bind(("role", Role::Admin))
                    .await?
                    .take(0)?,
                "fetching elevated accounts"
            );

            Ok(accounts)
        })
        .await
    }
}

/// Creates accounts. Identity is owned by the external auth provider, this only mirrors it.
#[derive(Clone, Debug, Serialize, Getters, Setters)]
pub struct WriteAccount<'a> {
    #[get = "pub"]
    #[set = "pub"]
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[get = "pub"]
    #[set = "pub"]
    #[serde(skip_serializing_if = "Option::is_none")]
    mail: Option<&'a str>,
    #[get = "pub"]
    #[set = "pub"]
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    #[get = "pub"]
    #[set = "pub"]
    #[serde(skip_serializing_if = "Option::is_none")]
    locale: Option<&'a str>,
    #[serde(skip)]
    info: &'a ConnectionInfo,
}

impl<'a> From<&'a ConnectionInfo> for WriteAccount<'a> {
    fn from(info: &'a ConnectionInfo) -> Self {
        Self {
            name: None,
            mail: None,
            role: None,
            locale: None,
            info,
        }
    }
}

impl<'a> IntoFuture for WriteAccount<'a> {
    type Output = Result<Account>;
    type IntoFuture = Pin<Box<dyn Future<Output = Self::Output> + Send + 'a>>;

    #[instrument(skip_all)]
    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move {
            if self.name.map_or(true, |name| name.trim().is_empty()) {
                return Err(ApplicationError::ValidationError(
                    "an account requires a name".to_owned(),
                ));
            }
            if self.mail.map_or(true, |mail| !mail.contains('@')) {
                return Err(ApplicationError::ValidationError(
                    "an account requires a valid mail".to_owned(),
                ));
            }

            let info = self.info;
            info.bounded(async move {
                let account: Option<Account> = sql_span!(
                    info.connection
                        .query("CREATE account CONTENT $content")
                        .bind(("content", &self))
                        .await?
                        .take(0)?,
                    "creating account"
                );

                account.ok_or(ApplicationError::InternalServerError)
            })
            .await
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::server::Config;

    #[tokio::test]
    async fn test_write() -> Result<()> {
        let info = crate::database::connect(&Config::default()).await?;

        let account = WriteAccount::from(&info)
            .set_name(Some("first"))
            .set_mail(Some("first@example.com"))
            .set_role(Some(Role::Admin))
            .to_owned()
            .await?;

        assert_eq!("first", account.name());
        assert_eq!("first@example.com", account.mail());
        assert_eq!(&Role::Admin, account.role());
        assert_eq!("es", account.locale());

        let fetched = Account::fetch(account.id(), &info).await?;
        assert_eq!(Some(account), fetched);

        Ok(())
    }

    #[tokio::test]
    async fn test_elevated_in_creation_order() -> Result<()> {
        let info = crate::database::connect(&Config::default()).await?;

        for (name, role) in [
            ("a", Role::Admin),
            ("b", Role::Viewer),
            ("c", Role::Admin),
            ("d", Role::Editor),
        ] {
            let mail = format!("{name}@example.com");
            WriteAccount::from(&info)
                .set_name(Some(name))
                .set_mail(Some(mail.as_str()))
                .set_role(Some(role))
                .to_owned()
                .await?;
        }

        let names: Vec<String> = Account::elevated(&info)
            .await?
            .into_iter()
            .map(|account| account.name().clone())
            .collect();
        assert_eq!(vec!["a".to_owned(), "c".to_owned()], names);

        Ok(())
    }

    #[tokio::test]
    async fn test_write_requires_mail() -> Result<()> {
        let info = crate::database::connect(&Config::default()).await?;

        let result = WriteAccount::from(&info)
            .set_name(Some("first"))
            .to_owned()
            .await;
        assert!(matches!(result, Err(ApplicationError::ValidationError(_))));

        Ok(())
    }
}
