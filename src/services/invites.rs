use crate::models::participant::NewParticipant;

/// Owner first, then one unconfirmed invitee per email in input order.
///
/// Repeated emails are kept as separate participants.
pub fn build_participants<I, S>(owner_name: &str, owner_email: &str, invitees: I) -> Vec<NewParticipant>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    std::iter::once(NewParticipant::owner(owner_name, owner_email))
        .chain(invitees.into_iter().map(|email| NewParticipant::invitee(email)))
        .collect()
}
