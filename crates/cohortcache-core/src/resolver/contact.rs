use tracing::info;

use super::{Resolved, Resolver};
use crate::api::{Filter, ListQuery};
use crate::auth::IdentityProvider;
use crate::cache::{keys, Volatility};
use crate::error::{DataError, ValidationError};
use crate::models::{Contact, ContactUpdate};
use crate::revalidate::{EntityKind, Mutation};
use crate::schema::{fields, FromRecord, ToFields};

impl Resolver {
    pub async fn get_contact(&self, id: &str) -> Resolved<Option<Contact>> {
        self.read("get_contact", |budget| async move {
            let contact = budget
                .run(
                    "get_contact",
                    self.cached_find(&self.tables.contacts, keys::CONTACTS, id, Volatility::Volatile),
                )
                .await?;
            Ok(Resolved::ok(contact))
        })
        .await
    }

    pub async fn get_contact_by_auth_id(&self, auth_id: &str) -> Resolved<Option<Contact>> {
        self.read("get_contact_by_auth_id", |budget| async move {
            let contact_id = budget
                .run("contact id for auth id", self.contact_id_for_auth(auth_id))
                .await?;
            let contact = match contact_id {
                Some(id) => {
                    budget
                        .run(
                            "get_contact",
                            self.cached_find(
                                &self.tables.contacts,
                                keys::CONTACTS,
                                &id,
                                Volatility::Volatile,
                            ),
                        )
                        .await?
                }
                None => None,
            };
            Ok(Resolved::ok(contact))
        })
        .await
    }

    /// The contact behind the signed-in user, or `None` when signed out.
    pub async fn get_current_contact(
        &self,
        identity: &dyn IdentityProvider,
    ) -> Resolved<Option<Contact>> {
        match identity.current_user() {
            Some(user) => self.get_contact_by_auth_id(&user.auth_id).await,
            None => Resolved::ok(None),
        }
    }

    /// Auth id -> contact id. The mapping never changes for a contact, so it
    /// is cached apart from the contact itself.
    async fn contact_id_for_auth(&self, auth_id: &str) -> Result<Option<String>, DataError> {
        let client = self.tables.contacts.clone();
        let query = ListQuery::filtered(Filter::eq(fields::contact::AUTH_ID, auth_id)).limit(1);
        self.cache
            .get_or_load(
                &keys::scoped_key(keys::CONTACTS, "auth", auth_id),
                &[keys::CONTACTS.to_string()],
                self.ttls.ttl(Volatility::Volatile),
                move || async move {
                    let records = client.list(&query).await?;
                    Ok(records.into_iter().next().map(|r| r.id))
                },
            )
            .await
    }

    pub async fn update_contact(
        &self,
        id: &str,
        update: ContactUpdate,
    ) -> Result<Contact, DataError> {
        let this = self.clone();
        let id = id.to_string();
        self.mutate("update_contact", async move { this.apply_contact_update(&id, update).await })
            .await
    }

    async fn apply_contact_update(
        &self,
        id: &str,
        update: ContactUpdate,
    ) -> Result<Contact, DataError> {
        if update.is_empty() {
            return Err(ValidationError::Invalid("nothing to update".to_string()).into());
        }
        if let Some(first) = &update.first_name {
            super::required(first, "first_name")?;
        }
        if let Some(last) = &update.last_name {
            super::required(last, "last_name")?;
        }
        if let Some(email) = &update.email {
            if !email.contains('@') {
                return Err(ValidationError::Invalid(format!("not an email address: {}", email)).into());
            }
        }

        let _existing: Contact = self.fresh(&self.tables.contacts, id).await?;
        let record = self.tables.contacts.update(id, update.to_fields()).await?;
        let contact = Contact::from_record(&record)?;

        self.revalidate(Mutation::new(EntityKind::Contact, id));
        info!(contact = id, "Updated contact");
        Ok(contact)
    }
}
